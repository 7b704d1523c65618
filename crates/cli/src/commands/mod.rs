pub mod auth;
pub mod components;
pub mod config;
pub mod publish;

pub use auth::{handle_login_command, handle_logout_command};
pub use components::{
    handle_add_command, handle_add_pack_command, handle_list_command, handle_remove_command,
    handle_remove_pack_command, handle_update_command,
};
pub use config::handle_config_command;
pub use publish::handle_publish_command;
