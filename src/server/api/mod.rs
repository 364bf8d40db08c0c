pub mod extract_controller;
pub mod health_controller;
pub mod proxy_controller;
pub mod subtitle_controller;
