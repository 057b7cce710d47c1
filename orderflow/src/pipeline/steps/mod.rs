//! Built-in step implementations.

mod delivery;
mod intake;
mod orders;
mod sales;
mod schema;

pub use delivery::{ExportInvoiceFile, NotifyInvoice, UploadInvoiceFile, INVOICE_HEADERS};
pub use intake::{
    MergeDuplicates, NormalizeRows, ReadSpreadsheet, ValidateRows, COL_ADDRESS, COL_MEMO, COL_ORDER_NO,
    COL_PHONE, COL_PRODUCT, COL_QUANTITY, COL_RECIPIENT, REQUIRED_COLUMNS,
};
pub use orders::{ClearBatchOrders, CompleteBatch, InsertOrders, MapProducts, RegisterBatch};
pub use sales::{CollectSalesOrders, InsertSalesInput, MarkSalesProcessed};
pub use schema::{EnsureCodeTable, SeedCodeTable};
