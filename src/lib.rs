pub mod config;
pub mod logging;
pub mod rates;
pub mod service;
pub mod status;
pub mod swap;

pub mod proto {
    pub mod v1 {
        tonic::include_proto!("swap_exchange.v1");
    }
}
