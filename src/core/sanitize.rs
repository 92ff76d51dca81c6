use regex::Regex;

/// Strip script/tag fragments, fenced code blocks, and common prompt-injection
/// phrasings from an inbound prompt. Untrusted text is echoed back into an HTML
/// context and fed to the model, so it must be sanitized before either use.
pub fn sanitize_prompt(text: &str) -> String {
    let script = Regex::new(r"(?is)<script.*?</script>").unwrap();
    let js_scheme = Regex::new(r"(?i)javascript:").unwrap();
    let injection =
        Regex::new(r"(?i)\b(ignore|disregard|forget)\s+(previous|above|all)\s+(instructions?|prompts?)")
            .unwrap();
    let fenced = Regex::new(r"```[\s\S]*?```").unwrap();
    let tags = Regex::new(r"<[^>]*>").unwrap();

    let text = script.replace_all(text, "");
    let text = js_scheme.replace_all(&text, "");
    let text = injection.replace_all(&text, "[removed]");
    let text = fenced.replace_all(&text, "[code removed]");
    let text = tags.replace_all(&text, "");
    text.trim().to_string()
}
