pub mod common;
pub mod constants;

#[cfg(test)]
mod tests;
