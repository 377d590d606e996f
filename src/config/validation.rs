use crate::mapping::{ForwardAddr, ListenAddr};
use std::net::IpAddr;
use validator::ValidationError;

fn address_error(code: &'static str, message: String) -> ValidationError {
    let mut err = ValidationError::new(code);
    err.message = Some(message.into());
    err
}

pub fn validate_listen_addr(value: &str) -> Result<(), ValidationError> {
    value
        .parse::<ListenAddr>()
        .map(|_| ())
        .map_err(|e| address_error("listen_addr_invalid", e.to_string()))
}

pub fn validate_forward_addr(value: &str) -> Result<(), ValidationError> {
    value
        .parse::<ForwardAddr>()
        .map(|_| ())
        .map_err(|e| address_error("forward_addr_invalid", e.to_string()))
}

pub fn validate_ip_address(value: &str) -> Result<(), ValidationError> {
    value.parse::<IpAddr>().map(|_| ()).map_err(|_| {
        address_error(
            "ip_address_invalid",
            format!("'{}' is not a valid IP address", value),
        )
    })
}
