//! The filtered list of expenses and its total.

use rust_decimal::Decimal;

use crate::{
    client::ExpenseClient,
    expense::{Expense, SortOrder},
};

/// Which expenses to show and in what order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExpenseFilters {
    /// Only show expenses in this category, compared case-insensitively.
    pub category: Option<String>,
    /// The order to show expenses in.
    pub sort: SortOrder,
}

/// The expenses matching the current filters.
#[derive(Debug, Clone, Default)]
pub struct ExpenseListView {
    filters: ExpenseFilters,
    expenses: Vec<Expense>,
    categories: Vec<String>,
    error: Option<String>,
}

impl ExpenseListView {
    /// An empty list that will show the expenses matching `filters`.
    pub fn new(filters: ExpenseFilters) -> Self {
        Self {
            filters,
            ..Self::default()
        }
    }

    /// The filters used by the next refresh.
    pub fn filters(&self) -> &ExpenseFilters {
        &self.filters
    }

    /// Only show expenses in `category`, or every expense if `category` is
    /// `None` or blank.
    pub fn set_category(&mut self, category: Option<String>) {
        self.filters.category = category
            .map(|category| category.trim().to_owned())
            .filter(|category| !category.is_empty());
    }

    /// Show expenses in `sort` order.
    pub fn set_sort(&mut self, sort: SortOrder) {
        self.filters.sort = sort;
    }

    /// The expenses from the last successful refresh.
    pub fn expenses(&self) -> &[Expense] {
        &self.expenses
    }

    /// The categories that can be filtered on.
    pub fn categories(&self) -> &[String] {
        &self.categories
    }

    /// The message for the user if the last refresh failed.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Fetch the expenses matching the filters and the list of categories.
    ///
    /// If the expenses cannot be fetched, the previous expenses are kept and
    /// [ExpenseListView::error] is set. Failing to fetch the categories only
    /// leaves the previous categories in place.
    pub async fn refresh(&mut self, client: &ExpenseClient) {
        match client.list_expenses(&self.filters).await {
            Ok(expenses) => {
                self.expenses = expenses;
                self.error = None;
            }
            Err(error) => {
                tracing::warn!("Could not load expenses: {error}");
                self.error = Some(error.user_message());
            }
        }

        match client.get_categories().await {
            Ok(categories) => self.categories = categories,
            Err(error) => tracing::debug!("Could not load categories: {error}"),
        }
    }

    /// The number of expenses shown.
    pub fn count(&self) -> usize {
        self.expenses.len()
    }

    /// The sum of the amounts of the expenses shown, or `None` if the sum
    /// is too large to represent.
    pub fn total(&self) -> Option<Decimal> {
        sum_amounts(&self.expenses)
    }

    /// The label for [ExpenseListView::total].
    pub fn total_label(&self) -> String {
        match &self.filters.category {
            Some(category) => format!("Total for \"{category}\""),
            None => "Total".to_owned(),
        }
    }

    /// A summary of how many expenses are shown, e.g. "3 expenses".
    pub fn count_label(&self) -> String {
        match self.count() {
            1 => "1 expense".to_owned(),
            count => format!("{count} expenses"),
        }
    }
}

/// Add up the amounts of `expenses` without rounding.
///
/// Returns `None` if the sum overflows.
pub fn sum_amounts(expenses: &[Expense]) -> Option<Decimal> {
    expenses.iter().try_fold(Decimal::ZERO, |total, expense| {
        total.checked_add(expense.amount.as_decimal())
    })
}
