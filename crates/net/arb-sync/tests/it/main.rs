#![allow(missing_docs)]

mod sync;

const fn main() {}
