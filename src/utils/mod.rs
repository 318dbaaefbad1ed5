pub(crate) mod net;

pub mod path;

#[cfg(test)]
mod utils_test;
