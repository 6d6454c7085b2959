// Magpie - evidence-backed AI code review for pull and merge requests
// Library exports

pub mod cache;
pub mod config;
pub mod platform;
pub mod provider;
pub mod review;
pub mod tools;
