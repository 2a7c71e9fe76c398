//! Board-level tests: the lifecycle controller driving real loops over fake adapters.
