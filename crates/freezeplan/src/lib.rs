pub mod analysis;
pub mod bundler;
pub mod classifier;
pub mod command;
pub mod config;
pub mod data_mapping;
pub mod heavy_deps;
pub mod literal_files;
pub mod profile;
pub mod python_env;
pub mod resolver;
pub mod scanner;
pub mod site_packages;
pub mod stdlib_detection;
#[cfg(test)]
mod test_utils;
pub mod types;
pub mod visitors;
