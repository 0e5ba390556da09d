//! HTTP handlers for the recommendation service

pub mod coverage;
pub mod health;
pub mod recommendations;

use catalyst_common::errors::Result;

/// Status code recorded in request metrics
pub(crate) fn status_of<T>(result: &Result<T>) -> u16 {
    match result {
        Ok(_) => 200,
        Err(e) => e.status_code().as_u16(),
    }
}
