pub(crate) mod correction;
pub mod track_writer;
