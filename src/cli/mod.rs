pub mod interface;
pub mod stub_agent;
pub mod user_proxy;

pub use interface::CliInterface;
