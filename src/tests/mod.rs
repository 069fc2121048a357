//! Crate-level tests spanning simplification, differentiation, the
//! bytecode interpreters and the variable graph together. Unit tests for
//! the individual passes live next to their modules.
