// ABOUTME: Environment module building per-step variable mappings
// ABOUTME: Layers built-in, workflow, job, and step variables with expansion

pub mod resolver;

pub use resolver::EnvironmentResolver;
