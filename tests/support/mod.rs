#![allow(dead_code)]

pub mod firefox;
pub mod socket_guard;
pub mod storefront;
