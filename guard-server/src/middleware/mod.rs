//! Request middleware

pub mod admin;
