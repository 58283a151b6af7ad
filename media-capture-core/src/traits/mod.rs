pub mod capture_delegate;
pub mod container_sink;
pub mod device_provider;
pub mod frame_consumer;
