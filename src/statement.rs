use crate::protocol::command::ColumnMeta;

/// A server-side prepared statement handle.
///
/// The handle stays valid until it is closed or its connection goes away;
/// executing it on another connection fails with `StatementNotValid`.
#[derive(Debug)]
pub struct Statement {
    id: u32,
    num_params: u16,
    num_columns: u16,
    param_meta: Vec<ColumnMeta>,
    column_meta: Vec<ColumnMeta>,
    connection_id: u32,
    closed: bool,
}

impl Statement {
    pub(crate) fn new(
        id: u32,
        num_params: u16,
        num_columns: u16,
        param_meta: Vec<ColumnMeta>,
        column_meta: Vec<ColumnMeta>,
        connection_id: u32,
    ) -> Self {
        Self {
            id,
            num_params,
            num_columns,
            param_meta,
            column_meta,
            connection_id,
            closed: false,
        }
    }

    /// The statement id assigned by the server
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Number of `?` placeholders
    pub fn num_params(&self) -> usize {
        self.num_params as usize
    }

    /// Number of columns in the statement's resultset
    pub fn num_columns(&self) -> usize {
        self.num_columns as usize
    }

    /// Metadata of the parameters, as reported by PREPARE
    pub fn param_meta(&self) -> &[ColumnMeta] {
        &self.param_meta
    }

    /// Metadata of the result columns, as reported by PREPARE
    pub fn column_meta(&self) -> &[ColumnMeta] {
        &self.column_meta
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub(crate) fn connection_id(&self) -> u32 {
        self.connection_id
    }

    pub(crate) fn mark_closed(&mut self) {
        self.closed = true;
    }
}
