pub mod config;
pub mod errors;

pub mod admin;
pub mod seed;

pub mod jwks;
pub mod jwt;
pub mod middleware;

pub mod pages;
pub mod routes;
