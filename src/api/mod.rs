//! HTTP routes. Each service mounts its own module's `routes()`.

pub mod cla;
pub mod ctf;
