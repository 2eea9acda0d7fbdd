use serde::Serialize;
use std::path::PathBuf;

use super::dependency::Dependency;
use super::ecosystem::{Ecosystem, PackageManager};

#[derive(Debug, Clone, Serialize)]
pub struct Project {
    pub name: String,
    pub root: PathBuf,
    pub ecosystem: Ecosystem,
    pub package_manager: PackageManager,
    pub production: Vec<Dependency>,
    pub development: Vec<Dependency>,
}

impl Project {
    pub fn dependency_count(&self) -> usize {
        self.production.len() + self.development.len()
    }
}
