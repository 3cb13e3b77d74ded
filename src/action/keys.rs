//! 特殊键分词
//!
//! 打字文本里可以内嵌 `<enter>`、`<tab>`、`<f1>` 等尖括号记号，分词后字面文本交给 type_text，
//! 记号映射为规范键名交给 press_key。记号大小写不敏感，字面文本原样保留。

/// 记号 → 规范键名（固定表）
const SPECIAL_KEYS: &[(&str, &str)] = &[
    ("<enter>", "enter"),
    ("<tab>", "tab"),
    ("<space>", "space"),
    ("<backspace>", "backspace"),
    ("<delete>", "delete"),
    ("<escape>", "escape"),
    ("<shift>", "shift"),
    ("<ctrl>", "ctrl"),
    ("<alt>", "alt"),
    ("<caps_lock>", "capslock"),
    ("<page_up>", "pageup"),
    ("<page_down>", "pagedown"),
    ("<home>", "home"),
    ("<end>", "end"),
    ("<insert>", "insert"),
    ("<up>", "up"),
    ("<down>", "down"),
    ("<left>", "left"),
    ("<right>", "right"),
    ("<f1>", "f1"),
    ("<f2>", "f2"),
    ("<f3>", "f3"),
    ("<f4>", "f4"),
    ("<f5>", "f5"),
    ("<f6>", "f6"),
    ("<f7>", "f7"),
    ("<f8>", "f8"),
    ("<f9>", "f9"),
    ("<f10>", "f10"),
    ("<f11>", "f11"),
    ("<f12>", "f12"),
];

/// 最长记号的字节数；超过此跨度的 `<...>` 不可能命中
fn longest_token_len() -> usize {
    SPECIAL_KEYS.iter().map(|(t, _)| t.len()).max().unwrap_or(0)
}

/// 查表：token 需已小写且包含尖括号
pub fn lookup_special_key(token: &str) -> Option<&'static str> {
    SPECIAL_KEYS
        .iter()
        .find(|(t, _)| *t == token)
        .map(|(_, name)| *name)
}

/// 全部已注册记号
pub fn special_key_tokens() -> impl Iterator<Item = &'static str> {
    SPECIAL_KEYS.iter().map(|(t, _)| *t)
}

/// 分词结果的一段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment<'a> {
    /// 字面文本（原样）
    Text(&'a str),
    /// 规范键名
    Key(&'static str),
}

/// 单次遍历的分词迭代器；由 [`tokenize`] 创建
///
/// 字面文本总是输入中的连续片段，因此直接借用切片。
#[derive(Debug, Clone)]
pub struct Segments<'a> {
    text: &'a str,
    /// 扫描位置（字节）
    pos: usize,
    /// 尚未输出的字面文本起点
    literal_start: usize,
}

impl<'a> Iterator for Segments<'a> {
    type Item = Segment<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let Some(offset) = self.text[self.pos..].find('<') else {
                // 剩余全部为字面文本
                self.pos = self.text.len();
                if self.literal_start < self.text.len() {
                    let rest = &self.text[self.literal_start..];
                    self.literal_start = self.text.len();
                    return Some(Segment::Text(rest));
                }
                return None;
            };
            let open = self.pos + offset;

            // 只在最长记号的跨度内找 `>`，避免远处的 `>` 让每个 `<` 都扫描到底
            let key = self.text.as_bytes()[open..]
                .iter()
                .take(longest_token_len())
                .position(|&b| b == b'>')
                .and_then(|close_offset| {
                    let close = open + close_offset;
                    let token = self.text[open..=close].to_ascii_lowercase();
                    lookup_special_key(&token).map(|name| (name, close))
                });

            match key {
                Some((name, close)) => {
                    if self.literal_start < open {
                        // 先吐出累计的字面文本，下一次调用会在同一位置再次命中记号
                        let literal = &self.text[self.literal_start..open];
                        self.literal_start = open;
                        self.pos = open;
                        return Some(Segment::Text(literal));
                    }
                    self.pos = close + 1;
                    self.literal_start = self.pos;
                    return Some(Segment::Key(name));
                }
                None => {
                    // 未命中：`<` 作为普通字符
                    self.pos = open + 1;
                }
            }
        }
    }
}

/// 将文本拆分为字面文本与特殊键
pub fn tokenize(text: &str) -> Segments<'_> {
    Segments {
        text,
        pos: 0,
        literal_start: 0,
    }
}

/// 特殊键帮助文本（CLI `keys` 子命令）
pub fn special_keys_help() -> String {
    let mut out = String::from(
        "Special keys can be embedded in typed text with angle brackets:\n\n",
    );
    for (token, name) in SPECIAL_KEYS {
        out.push_str(&format!("  {token:<13} -> {name}\n"));
    }
    out.push_str("\nExample: \"Name:<tab>John Doe<enter>\" types 'Name:', presses Tab, types 'John Doe', presses Enter.\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(text: &str) -> Vec<Segment<'_>> {
        tokenize(text).collect()
    }

    #[test]
    fn test_text_key_text() {
        assert_eq!(
            collect("Hello<enter>World"),
            vec![
                Segment::Text("Hello"),
                Segment::Key("enter"),
                Segment::Text("World")
            ]
        );
    }

    #[test]
    fn test_unclosed_bracket_is_literal() {
        assert_eq!(collect("a<b"), vec![Segment::Text("a<b")]);
    }

    #[test]
    fn test_unknown_token_is_literal() {
        assert_eq!(collect("<bogus>ok"), vec![Segment::Text("<bogus>ok")]);
    }

    #[test]
    fn test_token_case_insensitive_text_verbatim() {
        assert_eq!(
            collect("ABC<ENTER>dEf<Page_Up>"),
            vec![
                Segment::Text("ABC"),
                Segment::Key("enter"),
                Segment::Text("dEf"),
                Segment::Key("pageup")
            ]
        );
    }

    #[test]
    fn test_adjacent_keys_and_empty() {
        assert_eq!(
            collect("<tab><tab>"),
            vec![Segment::Key("tab"), Segment::Key("tab")]
        );
        assert!(collect("").is_empty());
    }

    #[test]
    fn test_literal_lt_before_key() {
        // 第一个 `<` 找到的 `>` 是 `<enter>` 的结尾，整段不在表中，因此按字面处理
        assert_eq!(
            collect("1 < 2<enter>"),
            vec![Segment::Text("1 < 2"), Segment::Key("enter")]
        );
    }

    #[test]
    fn test_multibyte_text_preserved() {
        assert_eq!(
            collect("你好<f12>世界"),
            vec![
                Segment::Text("你好"),
                Segment::Key("f12"),
                Segment::Text("世界")
            ]
        );
    }

    #[test]
    fn test_many_open_brackets_before_distant_close() {
        let text = format!("{}>", "<".repeat(100_000));
        assert_eq!(collect(&text), vec![Segment::Text(text.as_str())]);

        assert_eq!(
            collect("<<<enter>"),
            vec![Segment::Text("<<"), Segment::Key("enter")]
        );
        assert_eq!(collect("<enter        >"), vec![Segment::Text("<enter        >")]);
    }

    #[test]
    fn test_help_lists_every_token() {
        let help = special_keys_help();
        for token in special_key_tokens() {
            assert!(help.contains(token), "missing {token}");
        }
    }
}
