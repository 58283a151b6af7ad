pub mod notifier;
pub mod serial_queue;
