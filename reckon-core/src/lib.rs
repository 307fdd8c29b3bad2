//! reckon-core: statement data model, money/date primitives and engine configuration

pub mod config;
pub mod dates;
pub mod error;
pub mod model;
pub mod money;

pub use config::{
    AccountTypeRule, AmountColumns, ClassifierConfig, ClassifierRule, ColumnLayout, ColumnRange,
    LayoutRegistry, MatchKind, ReckonConfig, ReconcileConfig, SegmenterConfig,
};
pub use error::{
    DateError, MoneyError, SegmentationError, UnparsedLineWarning, UnreadablePdfError,
    UnreadableReason,
};
pub use model::{
    AccountType, BlockHeader, Direction, LineRef, RawLine, StatementBlock, TextSegment,
    Transaction, TransactionType,
};
pub use money::{NumberFormat, SignStyle};
