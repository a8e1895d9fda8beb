mod accounting;

pub use accounting::HeapAccounting;
