/// Routes Module Index
///
/// The application's own endpoints, split by who may call them. Each module
/// returns a child router that `create_router` mounts under its prefix; access
/// control lives in the child's own middleware chain, so it travels with the
/// routes wherever they are mounted.

/// Routes accessible to all callers.
pub mod public;

/// Routes guarded by `require_user`.
pub mod authenticated;
