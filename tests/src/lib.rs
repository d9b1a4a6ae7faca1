//! End-to-end checks of the engine, driven by scripted probers instead of the
//! network.
#![cfg(test)]

mod fakes;
mod scan;
mod sessions;
