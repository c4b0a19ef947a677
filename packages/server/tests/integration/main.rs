mod common;

mod generator;
mod repository;
mod sweeper;
