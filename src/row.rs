//! Row collections.
//!
//! A [`RowsView`] is contiguous field storage plus a row width: row `i` is
//! the slice `[i*width, (i+1)*width)`. It borrows the buffer owned by the
//! resultset and is invalidated by the next read on the same connection.
//! [`Rows`] carries the backing buffer with it, detaching that lifetime.

use crate::value::FieldView;

/// Borrowed rows: decoded fields over a buffer someone else owns.
#[derive(Debug, Clone, Copy)]
pub struct RowsView<'a> {
    fields: &'a [FieldView<'a>],
    num_columns: usize,
}

impl<'a> RowsView<'a> {
    pub(crate) fn new(fields: &'a [FieldView<'a>], num_columns: usize) -> Self {
        debug_assert!(num_columns > 0 || fields.is_empty());
        debug_assert!(num_columns == 0 || fields.len() % num_columns == 0);
        Self {
            fields,
            num_columns,
        }
    }

    pub fn num_rows(&self) -> usize {
        if self.num_columns == 0 {
            0
        } else {
            self.fields.len() / self.num_columns
        }
    }

    pub fn num_columns(&self) -> usize {
        self.num_columns
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Row `i` as a slice of fields, one per column.
    pub fn row(&self, i: usize) -> &'a [FieldView<'a>] {
        let start = i * self.num_columns;
        &self.fields[start..start + self.num_columns]
    }

    pub fn iter(&self) -> impl Iterator<Item = &'a [FieldView<'a>]> + 'a {
        // max(1) keeps chunks() legal for the empty zero-column view
        self.fields.chunks(self.num_columns.max(1))
    }

    /// The flat field storage, row-major.
    pub fn fields(&self) -> &'a [FieldView<'a>] {
        self.fields
    }
}

impl<'s, 'a> IntoIterator for &'s RowsView<'a> {
    type Item = &'a [FieldView<'a>];
    type IntoIter = core::slice::Chunks<'a, FieldView<'a>>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.chunks(self.num_columns.max(1))
    }
}

/// Owning rows: the packet bytes and the field views into them travel
/// together, so the collection outlives the connection read buffer.
#[derive(Debug)]
pub struct Rows {
    // field string payloads point into `buffer`; it is never mutated again
    _buffer: Vec<u8>,
    fields: Vec<FieldView<'static>>,
    num_columns: usize,
}

impl Rows {
    pub(crate) fn new(
        buffer: Vec<u8>,
        fields: Vec<FieldView<'static>>,
        num_columns: usize,
    ) -> Self {
        Self {
            _buffer: buffer,
            fields,
            num_columns,
        }
    }

    pub(crate) fn empty(num_columns: usize) -> Self {
        Self {
            _buffer: Vec::new(),
            fields: Vec::new(),
            num_columns,
        }
    }

    pub fn view(&self) -> RowsView<'_> {
        // FieldView is covariant in its lifetime; the 'static views shorten
        // to the borrow of self
        RowsView::new(&self.fields, self.num_columns)
    }

    pub fn num_rows(&self) -> usize {
        self.view().num_rows()
    }

    pub fn num_columns(&self) -> usize {
        self.num_columns
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn row(&self, i: usize) -> &[FieldView<'_>] {
        let start = i * self.num_columns;
        &self.fields[start..start + self.num_columns]
    }

    pub fn iter(&self) -> impl Iterator<Item = &[FieldView<'_>]> {
        // shorten the stored 'static views to the borrow of self
        let fields: &[FieldView<'_>] = &self.fields;
        fields.chunks(self.num_columns.max(1))
    }
}
