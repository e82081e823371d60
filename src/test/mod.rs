//! Shared fixtures for unit tests.


pub use factories::*;

use crate::sites::{ClassSite, MethodSite, Site};

/// The first method of the sample class named `name`.
pub fn sample_method_site(name: &str) -> MethodSite {
    let class = ClassSite::from_bytes(&sample_class_bytes()).unwrap();
    class
        .methods()
        .into_iter()
        .find(|m| m.name() == name)
        .unwrap()
}

/// The sample class as a site.
pub fn sample_site() -> ClassSite {
    ClassSite::from_bytes(&sample_class_bytes()).unwrap()
}
