pub mod poller;
pub mod price;
