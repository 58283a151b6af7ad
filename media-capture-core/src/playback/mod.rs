pub mod playback_controller;
