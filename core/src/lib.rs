pub mod catalog;
pub mod db;
pub mod models;
pub mod openfoodfacts;
pub mod seed;
pub mod service;
pub mod shopping;
