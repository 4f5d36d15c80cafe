/// Generate a unique route ID with format: `rt-{nanoid}`
pub fn route_id() -> String {
    format!("rt-{}", nanoid::nanoid!())
}

/// Generate a unique visit ID with format: `vs-{nanoid}`
pub fn visit_id() -> String {
    format!("vs-{}", nanoid::nanoid!())
}

/// Generate a unique transfer ID with format: `tr-{nanoid}`
pub fn transfer_id() -> String {
    format!("tr-{}", nanoid::nanoid!())
}

/// Generate a unique media reference with format: `md-{nanoid}`
pub fn media_id() -> String {
    format!("md-{}", nanoid::nanoid!())
}
