/// ASCII 空白字符
pub const WHITESPACES: &[char] = &[' ', '\t', '\n', '\x0c', '\r'];

/// 默认以块级方式渲染的元素
pub const BLOCK_DISPLAY_TAGS: &[&str] = &[
    "address", "article", "aside", "blockquote", "dd", "details", "div", "dl", "dt",
    "fieldset", "figcaption", "figure", "footer", "form", "h1", "h2", "h3", "h4", "h5", "h6",
    "header", "hr", "li", "main", "nav", "ol", "p", "pre", "section", "summary", "table", "ul",
];

/// 判断元素的渲染方式是否为块级
///
/// 没有样式引擎，只读取内联 `style` 的 display 声明，再退回到标签默认值
pub fn is_block_display(tag: &str, inline_style: Option<&str>) -> bool {
    if let Some(display) = inline_style.and_then(parse_display) {
        return !display.starts_with("inline") && display != "contents" && display != "none";
    }
    BLOCK_DISPLAY_TAGS.contains(&tag)
}

fn parse_display(style: &str) -> Option<String> {
    style
        .split(';')
        .filter_map(|decl| decl.split_once(':'))
        .filter(|(prop, _)| prop.trim().eq_ignore_ascii_case("display"))
        .map(|(_, value)| {
            value
                .trim()
                .trim_end_matches("!important")
                .trim()
                .to_ascii_lowercase()
        })
        .last()
}
