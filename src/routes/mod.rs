/// Router Module Index
///
/// The knowledge routes are all public: privilege is resolved inside the
/// controllers rather than by router layers.

/// Routes accessible to all callers (anonymous, portal and internal users).
pub mod public;
