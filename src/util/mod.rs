pub mod bounded_seq;
pub mod constants;
pub mod conversions;
pub mod heap;
pub mod logger;
pub mod options;

#[cfg(test)]
pub mod test_util;

pub use self::bounded_seq::BoundedSeq;
pub use self::options::Options;
