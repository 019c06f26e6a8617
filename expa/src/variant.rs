//! Table-container variants.
//!
//! The 32-bit game family aligns table headers to 4 bytes and relies
//! entirely on external descriptors; the 64-bit family aligns to 8 and
//! embeds a per-table type-tag list that external descriptors may only
//! refine with field names.

/// One table-container flavor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableVariant {
    pub name: &'static str,
    /// Alignment step for table headers and the chunk section.
    pub align_step: u64,
    /// Whether tables embed an inline type-tag list after their name.
    pub inline_types: bool,
    /// Default descriptor directory, relative to the working directory.
    pub schema_dir: &'static str,
}

pub const DSCS: TableVariant = TableVariant {
    name: "dscs",
    align_step: 4,
    inline_types: false,
    schema_dir: "structures/dscs",
};

pub const DSTS: TableVariant = TableVariant {
    name: "dsts",
    align_step: 8,
    inline_types: true,
    schema_dir: "structures/dsts",
};

pub const THL: TableVariant = TableVariant {
    name: "thl",
    align_step: 8,
    inline_types: true,
    schema_dir: "structures/thl",
};
