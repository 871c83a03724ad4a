//! Offset pagination value types.
//!
//! # Invariants
//! - Page indexes are zero-based.
//! - A page past the data has empty content and `has_next() == false`.
//! - `Page` carries a total; `Slice` never counts.

mod engine;

pub(crate) use engine::{fetch_page, fetch_slice, order_by, order_clause, order_keys, Window};

use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Direction {
    Asc,
    Desc,
}

impl Direction {
    pub(crate) fn keyword(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// One sort key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Order {
    pub property: String,
    pub direction: Direction,
}

impl Order {
    pub fn asc(property: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            direction: Direction::Asc,
        }
    }

    pub fn desc(property: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            direction: Direction::Desc,
        }
    }
}

/// Ordered list of sort keys; earlier keys take precedence.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Sort {
    orders: Vec<Order>,
}

impl Sort {
    pub fn unsorted() -> Self {
        Self::default()
    }

    pub fn by(order: Order) -> Self {
        Self {
            orders: vec![order],
        }
    }

    pub fn asc(property: impl Into<String>) -> Self {
        Self::by(Order::asc(property))
    }

    pub fn desc(property: impl Into<String>) -> Self {
        Self::by(Order::desc(property))
    }

    pub fn and(mut self, order: Order) -> Self {
        self.orders.push(order);
        self
    }

    pub fn orders(&self) -> &[Order] {
        &self.orders
    }

    pub fn is_unsorted(&self) -> bool {
        self.orders.is_empty()
    }
}

/// Requested window: page index, page size and sort.
///
/// Size `0` selects the configured default size; sizes above the configured
/// maximum are clamped when the request is executed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    page: u32,
    size: u32,
    sort: Sort,
}

impl PageRequest {
    pub fn of(page: u32, size: u32) -> Self {
        Self {
            page,
            size,
            sort: Sort::unsorted(),
        }
    }

    pub fn with_sort(mut self, sort: Sort) -> Self {
        self.sort = sort;
        self
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn sort(&self) -> &Sort {
        &self.sort
    }

    pub fn next(&self) -> Self {
        Self {
            page: self.page.saturating_add(1),
            ..self.clone()
        }
    }
}

/// One window of results with the total element count.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    content: Vec<T>,
    number: u32,
    size: u32,
    total_elements: u64,
}

impl<T> Page<T> {
    pub(crate) fn new(content: Vec<T>, number: u32, size: u32, total_elements: u64) -> Self {
        Self {
            content,
            number,
            size,
            total_elements,
        }
    }

    pub fn content(&self) -> &[T] {
        &self.content
    }

    pub fn into_content(self) -> Vec<T> {
        self.content
    }

    pub fn number(&self) -> u32 {
        self.number
    }

    /// Effective page size after defaulting and clamping.
    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn number_of_elements(&self) -> usize {
        self.content.len()
    }

    pub fn total_elements(&self) -> u64 {
        self.total_elements
    }

    pub fn total_pages(&self) -> u64 {
        if self.size == 0 {
            return 1;
        }
        self.total_elements.div_ceil(u64::from(self.size))
    }

    pub fn is_first(&self) -> bool {
        self.number == 0
    }

    pub fn is_last(&self) -> bool {
        !self.has_next()
    }

    pub fn has_next(&self) -> bool {
        u64::from(self.number) + 1 < self.total_pages()
    }

    pub fn has_previous(&self) -> bool {
        self.number > 0
    }

    /// Converts the content, keeping paging metadata (entity page → DTO page).
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            content: self.content.into_iter().map(f).collect(),
            number: self.number,
            size: self.size,
            total_elements: self.total_elements,
        }
    }
}

impl<T: Serialize> Serialize for Page<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("Page", 8)?;
        state.serialize_field("content", &self.content)?;
        state.serialize_field("number", &self.number)?;
        state.serialize_field("size", &self.size)?;
        state.serialize_field("total_elements", &self.total_elements)?;
        state.serialize_field("total_pages", &self.total_pages())?;
        state.serialize_field("first", &self.is_first())?;
        state.serialize_field("last", &self.is_last())?;
        state.serialize_field("has_next", &self.has_next())?;
        state.end()
    }
}

/// One window of results that only knows whether another window follows.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Slice<T> {
    content: Vec<T>,
    number: u32,
    size: u32,
    has_next: bool,
}

impl<T> Slice<T> {
    pub(crate) fn new(content: Vec<T>, number: u32, size: u32, has_next: bool) -> Self {
        Self {
            content,
            number,
            size,
            has_next,
        }
    }

    pub fn content(&self) -> &[T] {
        &self.content
    }

    pub fn into_content(self) -> Vec<T> {
        self.content
    }

    pub fn number(&self) -> u32 {
        self.number
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn number_of_elements(&self) -> usize {
        self.content.len()
    }

    pub fn is_first(&self) -> bool {
        self.number == 0
    }

    pub fn is_last(&self) -> bool {
        !self.has_next
    }

    pub fn has_next(&self) -> bool {
        self.has_next
    }

    pub fn has_previous(&self) -> bool {
        self.number > 0
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Slice<U> {
        Slice {
            content: self.content.into_iter().map(f).collect(),
            number: self.number,
            size: self.size,
            has_next: self.has_next,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Page, PageRequest, Sort};

    #[test]
    fn page_metadata_follows_total() {
        let page = Page::new(vec![1, 2, 3], 0, 3, 5);
        assert_eq!(page.total_pages(), 2);
        assert!(page.is_first());
        assert!(page.has_next());
        assert!(!page.has_previous());

        let last = Page::new(vec![4, 5], 1, 3, 5);
        assert!(last.is_last());
        assert!(!last.has_next());
    }

    #[test]
    fn page_past_the_end_has_no_next() {
        let page: Page<i32> = Page::new(Vec::new(), 7, 3, 5);
        assert!(page.content().is_empty());
        assert!(!page.has_next());
        assert!(page.has_previous());
    }

    #[test]
    fn map_keeps_metadata() {
        let page = Page::new(vec![1, 2], 1, 2, 6).map(|value| value * 10);
        assert_eq!(page.content(), &[10, 20]);
        assert_eq!(page.total_elements(), 6);
        assert_eq!(page.number(), 1);
    }

    #[test]
    fn next_request_keeps_sort() {
        let request = PageRequest::of(0, 3).with_sort(Sort::desc("username"));
        let next = request.next();
        assert_eq!(next.page(), 1);
        assert_eq!(next.sort(), request.sort());
    }
}
