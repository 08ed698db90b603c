//! Maps source file extensions to the build step that handles them.
//!
//! ## Structure
//! - **Compressed copies**: `.html .css .js .json .svg`
//! - **Plain copies**: images, fonts, shaders and models
//! - **Compiled**: `.less`, `.coffee`, `.coffeejson`, `.go`
//! - **Ignored**: `.DS_Store`
//!
//! Extensions not listed here are reported and skipped.

use crate::handlers::build_handlers::BuildHandler;
use std::collections::HashMap;

/// Directory names that are never descended into.
pub const IGNORED_NAMES: &[&str] = &[".git"];

pub fn routes() -> HashMap<&'static str, BuildHandler> {
    HashMap::from([
        (".less", BuildHandler::Less),
        (".html", BuildHandler::CopyAndZip),
        (".css", BuildHandler::CopyAndZip),
        (".js", BuildHandler::CopyAndZip),
        (".json", BuildHandler::CopyAndZip),
        (".svg", BuildHandler::CopyAndZip),
        (".jpg", BuildHandler::Copy),
        (".jpeg", BuildHandler::Copy),
        (".png", BuildHandler::Copy),
        (".gif", BuildHandler::Copy),
        (".woff", BuildHandler::Copy),
        (".ttf", BuildHandler::Copy),
        (".eot", BuildHandler::Copy),
        (".otf", BuildHandler::Copy),
        (".fs", BuildHandler::Copy),
        (".vs", BuildHandler::Copy),
        (".dae", BuildHandler::Copy),
        (".coffee", BuildHandler::CoffeeScript),
        (".coffeejson", BuildHandler::CoffeeJson),
        (".go", BuildHandler::Go),
        (".DS_Store", BuildHandler::Ignore),
    ])
}
