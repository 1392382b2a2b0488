pub mod auth;
pub mod bus;
pub mod config;
pub mod db;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod stores;
pub mod websocket;
pub mod ws;
