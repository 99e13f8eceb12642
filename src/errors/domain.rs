pub trait ErrorCode {
    #[allow(clippy::wrong_self_convention)]
    fn as_code_str(self) -> &'static str;
}

pub fn classify_message_by_patterns<C: Copy>(
    message: &str,
    rules: &[(C, &[&str])],
    fallback: C,
) -> C {
    let normalized = message.to_ascii_lowercase();
    for &(code, patterns) in rules {
        if patterns.iter().any(|pattern| normalized.contains(pattern)) {
            return code;
        }
    }
    fallback
}
