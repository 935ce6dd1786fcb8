//! Sharded storage paths for archived content
//!
//! Assets land in `<type>/<shard>/<file>` where the shard is the thousands
//! group of the id, so no directory holds more than a thousand entries.

/// Three-digit shard directory for an asset id: `(id / 1000) % 1000`, zero padded.
pub fn shard(id: i64) -> String {
    format!("{:03}", (id / 1000).rem_euclid(1000))
}

/// Extension of a file name (text after the last dot), case preserved.
pub fn file_extension(name: &str) -> Option<&str> {
    name.rsplit_once('.')
        .map(|(_, ext)| ext)
        .filter(|ext| !ext.is_empty())
}

/// Render a filename template. Supported placeholders are `{id}`, `{name}` and
/// `{ext}`; a template ending in a dot loses it when the name has no extension.
pub fn render_file_name(template: &str, id: i64, name: &str, extension: Option<&str>) -> String {
    let rendered = template
        .replace("{id}", &id.to_string())
        .replace("{name}", name)
        .replace("{ext}", extension.unwrap_or_default());
    match rendered.strip_suffix('.') {
        Some(trimmed) if extension.is_none() => trimmed.to_string(),
        _ => rendered,
    }
}

/// Relative content path `<type_key>/<shard>/<rendered template>`.
pub fn content_path(
    type_key: &str,
    template: &str,
    id: i64,
    name: &str,
    extension: Option<&str>,
) -> String {
    format!(
        "{}/{}/{}",
        type_key,
        shard(id),
        render_file_name(template, id, name, extension)
    )
}
