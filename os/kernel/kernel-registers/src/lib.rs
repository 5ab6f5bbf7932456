//! # Typed `X86_64` Registers
//!
//! Bitfield views of the model-specific registers the interrupt core touches.
//! The raw `rdmsr`/`wrmsr` accessors are only compiled with the `asm` feature;
//! without it the types are plain values, which is what host-side tests use.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

#[cfg(feature = "msr")]
pub mod msr;
