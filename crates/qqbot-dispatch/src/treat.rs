//! Message treatment.

/// Normalise message content for handlers.
///
/// Strips a leading mention of `bot_id` (any leading mention when the id is
/// not known yet), drops one leading `/`, unescapes `&lt; &gt; &amp;`,
/// turns NBSPs into spaces, and trims.
pub fn treat_msg(content: &str, bot_id: Option<&str>) -> String {
    let mut text = content.trim_start();
    if let Some(rest) = strip_mention(text, bot_id) {
        text = rest.trim_start();
    }
    let text = text.strip_prefix('/').unwrap_or(text);

    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
        .replace('\u{a0}', " ")
        .trim()
        .to_string()
}

/// Whether `content` carries the `<@id>` or `<@!id>` mention token.
pub fn has_mention(content: &str, bot_id: &str) -> bool {
    !bot_id.is_empty()
        && (content.contains(&format!("<@!{}>", bot_id)) || content.contains(&format!("<@{}>", bot_id)))
}

fn strip_mention<'a>(text: &'a str, bot_id: Option<&str>) -> Option<&'a str> {
    let inner_start = text.strip_prefix("<@")?;
    let end = inner_start.find('>')?;
    let id = inner_start[..end].strip_prefix('!').unwrap_or(&inner_start[..end]);
    if id.is_empty() || id.contains(char::is_whitespace) {
        return None;
    }
    match bot_id {
        Some(bot_id) if bot_id != id => None,
        _ => Some(&inner_start[end + 1..]),
    }
}
