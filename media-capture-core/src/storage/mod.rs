pub mod container_format;
pub mod container_reader;
pub mod container_writer;
pub mod metadata;
