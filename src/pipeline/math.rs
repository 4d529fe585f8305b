//! Math-notation subset → native SVG text spans.
//!
//! Renderers do not understand TeX inside `<text>` elements, so `$…$` spans
//! are rewritten into Unicode glyphs and `<tspan>` runs before rasterising.
//! The default [`TokenTable`] is a small recursive tokenizer over a finite
//! command table; anything it does not know is emitted as the bare command
//! name so the reader still sees something sensible.

use once_cell::sync::Lazy;
use std::collections::HashMap;

/// Translates one math expression (without its `$` delimiters) into SVG
/// text content.
///
/// Output must be valid inside a `<text>` element: plain characters plus
/// balanced `<tspan>` markup.
pub trait MathTranslator: Send + Sync {
    fn translate(&self, expression: &str) -> String;
}

const SUPERSCRIPT: &str = r#"<tspan baseline-shift="super" font-size="0.8em">"#;
const SUBSCRIPT: &str = r#"<tspan baseline-shift="sub" font-size="0.8em">"#;
const ITALIC: &str = r#"<tspan font-style="italic">"#;
const BOLD: &str = r#"<tspan font-weight="bold">"#;
const OVERLINE: &str = r#"<tspan text-decoration="overline">"#;
const CLOSE: &str = "</tspan>";

/// Opening tag wrapped around every translated expression.
pub const EXPRESSION_SPAN: &str = r#"<tspan font-family="serif" font-style="italic">"#;

static SYMBOLS: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    [
        // Greek, lower case
        ("alpha", "α"),
        ("beta", "β"),
        ("gamma", "γ"),
        ("delta", "δ"),
        ("epsilon", "ε"),
        ("varepsilon", "ε"),
        ("zeta", "ζ"),
        ("eta", "η"),
        ("theta", "θ"),
        ("vartheta", "ϑ"),
        ("iota", "ι"),
        ("kappa", "κ"),
        ("lambda", "λ"),
        ("mu", "μ"),
        ("nu", "ν"),
        ("xi", "ξ"),
        ("pi", "π"),
        ("varpi", "ϖ"),
        ("rho", "ρ"),
        ("varrho", "ϱ"),
        ("sigma", "σ"),
        ("varsigma", "ς"),
        ("tau", "τ"),
        ("upsilon", "υ"),
        ("phi", "φ"),
        ("varphi", "ϕ"),
        ("chi", "χ"),
        ("psi", "ψ"),
        ("omega", "ω"),
        // Greek, upper case
        ("Gamma", "Γ"),
        ("Delta", "Δ"),
        ("Theta", "Θ"),
        ("Lambda", "Λ"),
        ("Xi", "Ξ"),
        ("Pi", "Π"),
        ("Sigma", "Σ"),
        ("Upsilon", "Υ"),
        ("Phi", "Φ"),
        ("Psi", "Ψ"),
        ("Omega", "Ω"),
        // Operators
        ("times", "×"),
        ("div", "÷"),
        ("pm", "±"),
        ("mp", "∓"),
        ("cdot", "·"),
        ("ast", "∗"),
        ("star", "⋆"),
        ("circ", "∘"),
        ("bullet", "•"),
        ("oplus", "⊕"),
        ("otimes", "⊗"),
        ("cup", "∪"),
        ("cap", "∩"),
        ("setminus", "∖"),
        ("wedge", "∧"),
        ("land", "∧"),
        ("vee", "∨"),
        ("lor", "∨"),
        ("neg", "¬"),
        ("lnot", "¬"),
        // Relations
        ("leq", "≤"),
        ("le", "≤"),
        ("geq", "≥"),
        ("ge", "≥"),
        ("neq", "≠"),
        ("ne", "≠"),
        ("approx", "≈"),
        ("equiv", "≡"),
        ("sim", "∼"),
        ("simeq", "≃"),
        ("cong", "≅"),
        ("propto", "∝"),
        ("ll", "≪"),
        ("gg", "≫"),
        ("in", "∈"),
        ("notin", "∉"),
        ("ni", "∋"),
        ("subset", "⊂"),
        ("supset", "⊃"),
        ("subseteq", "⊆"),
        ("supseteq", "⊇"),
        ("perp", "⊥"),
        ("parallel", "∥"),
        ("mid", "∣"),
        // Arrows
        ("to", "→"),
        ("rightarrow", "→"),
        ("leftarrow", "←"),
        ("gets", "←"),
        ("leftrightarrow", "↔"),
        ("Rightarrow", "⇒"),
        ("Leftarrow", "⇐"),
        ("Leftrightarrow", "⇔"),
        ("implies", "⟹"),
        ("iff", "⟺"),
        ("mapsto", "↦"),
        ("uparrow", "↑"),
        ("downarrow", "↓"),
        // Big operators
        ("sum", "∑"),
        ("prod", "∏"),
        ("coprod", "∐"),
        ("int", "∫"),
        ("iint", "∬"),
        ("iiint", "∭"),
        ("oint", "∮"),
        ("bigcup", "⋃"),
        ("bigcap", "⋂"),
        // Misc
        ("infty", "∞"),
        ("partial", "∂"),
        ("nabla", "∇"),
        ("forall", "∀"),
        ("exists", "∃"),
        ("emptyset", "∅"),
        ("varnothing", "∅"),
        ("angle", "∠"),
        ("triangle", "△"),
        ("degree", "°"),
        ("prime", "′"),
        ("hbar", "ℏ"),
        ("ell", "ℓ"),
        ("Re", "ℜ"),
        ("Im", "ℑ"),
        ("aleph", "ℵ"),
        ("langle", "⟨"),
        ("rangle", "⟩"),
        ("lceil", "⌈"),
        ("rceil", "⌉"),
        ("lfloor", "⌊"),
        ("rfloor", "⌋"),
        ("ldots", "…"),
        ("cdots", "⋯"),
        ("vdots", "⋮"),
        ("ddots", "⋱"),
        ("dots", "…"),
        ("lbrace", "{"),
        ("rbrace", "}"),
        ("vert", "|"),
        ("Vert", "‖"),
        ("quad", "  "),
        ("qquad", "    "),
    ]
    .into_iter()
    .collect()
});

/// Commands that only affect TeX layout and produce no output.
const IGNORED: &[&str] = &[
    "left",
    "right",
    "big",
    "Big",
    "bigg",
    "Bigg",
    "bigl",
    "bigr",
    "Bigl",
    "Bigr",
    "displaystyle",
    "textstyle",
    "limits",
    "nolimits",
];

/// Default translator: tokenizer plus substitution table.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenTable;

impl MathTranslator for TokenTable {
    fn translate(&self, expression: &str) -> String {
        let mut cursor = Cursor::new(expression);
        let mut out = String::new();
        cursor.sequence(&mut out, None);
        out
    }
}

struct Cursor {
    chars: Vec<char>,
    pos: usize,
}

impl Cursor {
    fn new(source: &str) -> Self {
        Self {
            chars: source.chars().collect(),
            pos: 0,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        Some(c)
    }

    fn skip_spaces(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
    }

    /// Translate tokens until `stop` (consumed) or end of input.
    fn sequence(&mut self, out: &mut String, stop: Option<char>) {
        while let Some(c) = self.peek() {
            if Some(c) == stop {
                self.pos += 1;
                return;
            }
            match c {
                '\\' => self.command(out),
                '^' => {
                    self.pos += 1;
                    let arg = self.argument();
                    wrap(out, SUPERSCRIPT, &arg);
                }
                '_' => {
                    self.pos += 1;
                    let arg = self.argument();
                    wrap(out, SUBSCRIPT, &arg);
                }
                '{' => {
                    self.pos += 1;
                    self.sequence(out, Some('}'));
                }
                '}' => self.pos += 1,
                '~' => {
                    self.pos += 1;
                    out.push(' ');
                }
                '\'' => {
                    self.pos += 1;
                    out.push('′');
                }
                _ => {
                    self.pos += 1;
                    out.push(c);
                }
            }
        }
    }

    /// One argument: a braced group, a command, or a single character.
    fn argument(&mut self) -> String {
        self.skip_spaces();
        let mut out = String::new();
        match self.peek() {
            Some('{') => {
                self.pos += 1;
                self.sequence(&mut out, Some('}'));
            }
            Some('\\') => self.command(&mut out),
            Some(c) => {
                self.pos += 1;
                out.push(c);
            }
            None => {}
        }
        out
    }

    /// Raw text of a braced group, untranslated.
    fn raw_group(&mut self) -> String {
        self.skip_spaces();
        if self.peek() != Some('{') {
            return String::new();
        }
        self.pos += 1;
        let mut depth = 1;
        let mut raw = String::new();
        while let Some(c) = self.bump() {
            match c {
                '{' => depth += 1,
                '}' => {
                    depth -= 1;
                    if depth == 0 {
                        break;
                    }
                }
                _ => {}
            }
            raw.push(c);
        }
        raw
    }

    fn command(&mut self, out: &mut String) {
        self.pos += 1; // backslash
        let Some(first) = self.peek() else {
            out.push('\\');
            return;
        };
        if !first.is_ascii_alphabetic() {
            self.pos += 1;
            match first {
                ',' | ':' | ';' | ' ' | '\\' => out.push(' '),
                '!' => {}
                '&' => out.push_str("&amp;"),
                '|' => out.push('‖'),
                other => out.push(other),
            }
            return;
        }

        let start = self.pos;
        while self.peek().is_some_and(|c| c.is_ascii_alphabetic()) {
            self.pos += 1;
        }
        let name: String = self.chars[start..self.pos].iter().collect();

        match name.as_str() {
            "frac" | "dfrac" | "tfrac" => {
                let numerator = self.argument();
                let denominator = self.argument();
                out.push_str(&group(&numerator));
                out.push('/');
                out.push_str(&group(&denominator));
            }
            "sqrt" => {
                self.skip_spaces();
                if self.peek() == Some('[') {
                    let mut index = String::new();
                    self.pos += 1;
                    while let Some(c) = self.bump() {
                        if c == ']' {
                            break;
                        }
                        index.push(c);
                    }
                    wrap(out, SUPERSCRIPT, index.trim());
                }
                let radicand = self.argument();
                out.push('√');
                out.push_str(&group(&radicand));
            }
            "vec" | "overrightarrow" | "overline" | "bar" => {
                let arg = self.argument();
                wrap(out, OVERLINE, &arg);
            }
            "hat" | "widehat" => combine(out, &self.argument(), '\u{0302}'),
            "tilde" | "widetilde" => combine(out, &self.argument(), '\u{0303}'),
            "dot" => combine(out, &self.argument(), '\u{0307}'),
            "ddot" => combine(out, &self.argument(), '\u{0308}'),
            "mathbf" | "textbf" | "boldsymbol" | "bm" => {
                let arg = self.argument();
                wrap(out, BOLD, &arg);
            }
            "mathit" | "textit" | "emph" => {
                let arg = self.argument();
                wrap(out, ITALIC, &arg);
            }
            "text" | "mathrm" | "textrm" | "operatorname" | "mathsf" | "mathtt" | "mbox"
            | "mathcal" | "mathbb" => {
                let arg = self.argument();
                out.push_str(&arg);
            }
            "begin" => self.environment(out),
            "end" => {
                self.raw_group();
            }
            n if IGNORED.contains(&n) => {
                if self.peek() == Some('.') {
                    self.pos += 1;
                }
            }
            n => match SYMBOLS.get(n) {
                Some(glyph) => out.push_str(glyph),
                None => out.push_str(n),
            },
        }
    }

    fn environment(&mut self, out: &mut String) {
        let name = self.raw_group();
        let closing: Vec<char> = format!("\\end{{{name}}}").chars().collect();
        let body_start = self.pos;
        let body_end = (body_start..self.chars.len())
            .find(|&i| self.chars[i..].starts_with(&closing))
            .unwrap_or(self.chars.len());
        let body: String = self.chars[body_start..body_end].iter().collect();
        self.pos = (body_end + closing.len()).min(self.chars.len());

        let base = name.trim_end_matches('*');
        if base == "vmatrix" || base == "Vmatrix" {
            out.push_str("|⋯|");
        } else if base.ends_with("matrix") {
            out.push_str("[⋯]");
        } else {
            let flattened = body.replace("&amp;", " ").replace('&', " ");
            let mut inner = Cursor::new(&flattened);
            inner.sequence(out, None);
        }
    }
}

fn wrap(out: &mut String, open: &str, content: &str) {
    if content.is_empty() {
        return;
    }
    out.push_str(open);
    out.push_str(content);
    out.push_str(CLOSE);
}

fn combine(out: &mut String, base: &str, mark: char) {
    out.push_str(base);
    out.push(mark);
}

/// Parenthesise multi-character operands so `a+b/c` stays readable.
fn group(operand: &str) -> String {
    if operand.chars().count() <= 1 {
        operand.to_string()
    } else {
        format!("({operand})")
    }
}

/// True when every `<tspan>` opened in `markup` is closed in order.
pub fn tspans_balanced(markup: &str) -> bool {
    let mut depth: usize = 0;
    let mut rest = markup;
    while let Some(pos) = rest.find('<') {
        rest = &rest[pos..];
        let Some(end) = rest.find('>') else {
            return false;
        };
        let tag = &rest[..=end];
        if tag.starts_with("</tspan") {
            match depth.checked_sub(1) {
                Some(d) => depth = d,
                None => return false,
            }
        } else if tag.starts_with("<tspan") && !tag.ends_with("/>") {
            depth += 1;
        }
        rest = &rest[end + 1..];
    }
    depth == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(src: &str) -> String {
        TokenTable.translate(src)
    }

    #[test]
    fn greek_and_operators() {
        assert_eq!(t(r"\alpha + \beta \leq \Omega"), "α + β ≤ Ω");
        assert_eq!(t(r"a \times b \to \infty"), "a × b → ∞");
    }

    #[test]
    fn longest_command_name_wins() {
        // `\in` must not eat the prefix of `\infty`
        assert_eq!(t(r"x \in S, \infty"), "x ∈ S, ∞");
        assert_eq!(t(r"\leftarrow \leq"), "← ≤");
    }

    #[test]
    fn scripts() {
        assert_eq!(
            t("x^2"),
            format!("x{SUPERSCRIPT}2{CLOSE}")
        );
        assert_eq!(
            t("C_{p,max}"),
            format!("C{SUBSCRIPT}p,max{CLOSE}")
        );
        assert_eq!(
            t(r"e^{i\pi}"),
            format!("e{SUPERSCRIPT}iπ{CLOSE}")
        );
    }

    #[test]
    fn fractions() {
        assert_eq!(t(r"\frac{a+b}{2}"), "(a+b)/2");
        assert_eq!(t(r"\frac12"), "1/2");
    }

    #[test]
    fn accents_and_wrappers() {
        assert_eq!(t(r"\hat{x}"), "x\u{0302}");
        assert_eq!(t(r"\tilde n"), "n\u{0303}");
        assert_eq!(t(r"\vec{v}"), format!("{OVERLINE}v{CLOSE}"));
        assert_eq!(t(r"\mathbf{F}"), format!("{BOLD}F{CLOSE}"));
        assert_eq!(t(r"\text{max}"), "max");
        assert_eq!(t(r"\sqrt{x}"), "√x");
        assert_eq!(t(r"\sqrt{x+1}"), "√(x+1)");
    }

    #[test]
    fn matrices_collapse() {
        assert_eq!(t(r"A = \begin{pmatrix} 1 & 2 \\ 3 & 4 \end{pmatrix}"), "A = [⋯]");
        assert_eq!(t(r"\det = \begin{vmatrix} a & b \end{vmatrix}"), "det = |⋯|");
    }

    #[test]
    fn delimiters_sized_commands_dropped() {
        assert_eq!(t(r"\left( x \right)"), "( x )");
        assert_eq!(t(r"\left. x \right|"), " x |");
    }

    #[test]
    fn unknown_command_keeps_name() {
        assert_eq!(t(r"\foo x"), "foo x");
    }

    #[test]
    fn output_is_balanced() {
        for src in [r"x^{a_{b^c}}", r"\frac{x^2}{y_1}", r"\mathbf{\vec{v}}_i", "}{^"] {
            assert!(tspans_balanced(&t(src)), "unbalanced for {src}");
        }
    }

    #[test]
    fn balance_check() {
        assert!(tspans_balanced("plain"));
        assert!(tspans_balanced("<tspan a=\"1\">x<tspan>y</tspan></tspan>"));
        assert!(tspans_balanced("<tspan/>"));
        assert!(!tspans_balanced("<tspan>x"));
        assert!(!tspans_balanced("</tspan><tspan>"));
    }
}
