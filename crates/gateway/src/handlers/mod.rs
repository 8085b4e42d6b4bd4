//! API handlers module

pub mod admin;
pub mod health;
pub mod projects;
pub mod purchase_orders;
