//! The API endpoints URIs.

/// The liveness probe.
pub const HEALTH: &str = "/health";
/// The route to create and list expenses.
pub const EXPENSES: &str = "/expenses";
/// The route to list the distinct expense categories.
pub const EXPENSE_CATEGORIES: &str = "/expenses/categories";
