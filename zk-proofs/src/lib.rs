//! ZK layer for the contribution credential system.
//!
//! This crate contains:
//! - The constraint primitive library, natively ([`primitives`]) and as R1CS gadgets ([`gadgets`]).
//! - One Groth16 circuit per credential type and the public input contract they share with the
//!   verifier ([`circuit`], [`statement`]).
//! - Prover and verifier orchestration plus key/proof serialization ([`groth16`]).

pub mod circuit;
pub mod constants;
pub mod gadgets;
pub mod groth16;
pub mod hash;
pub mod merkle;
pub mod primitives;
pub mod statement;
pub mod types;
