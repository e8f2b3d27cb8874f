pub mod group_service;
pub mod monitor_service;
pub mod notification_log_service;
pub mod result_service;
pub mod settings_service;
pub mod state_service;
pub mod subscription_service;
pub mod user_service;
