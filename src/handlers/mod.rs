pub mod build_handlers;
