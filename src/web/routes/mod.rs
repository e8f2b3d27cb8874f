pub mod event_routes;
pub mod group_routes;
pub mod monitor_routes;
pub mod notification_routes;
pub mod settings_routes;
pub mod setup_routes;
pub mod subscription_routes;
