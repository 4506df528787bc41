//! Rewrites captured figure markers in stdout into inline images.

use std::sync::OnceLock;

use regex::{Captures, Regex};

pub const FIGURE_START: &str = "<matplotlib_figure>";
pub const FIGURE_END: &str = "</matplotlib_figure>";

fn figure_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(&format!(
            "(?s){}(.*?){}",
            regex::escape(FIGURE_START),
            regex::escape(FIGURE_END)
        ))
        .expect("figure marker pattern compiles")
    })
}

/// Replaces every marker pair with an `<img>` carrying the base64 payload.
/// Text outside the markers is left untouched.
pub fn render_figures(stdout: &str) -> String {
    figure_pattern()
        .replace_all(stdout, |caps: &Captures| {
            format!(r#"<img src="data:image/png;base64,{}" alt="Plot" />"#, &caps[1])
        })
        .into_owned()
}

pub fn annotate_runtime(output: &str, seconds: f64) -> String {
    format!("{output}\n\n// Code executed in {seconds:.2} seconds")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_without_markers_is_unchanged() {
        let text = "hello\n<b>not a figure</b>\n";
        assert_eq!(render_figures(text), text);
    }

    #[test]
    fn single_marker_becomes_image() {
        let text = "before\n<matplotlib_figure>iVBORw0KGgo=</matplotlib_figure>\nafter\n";
        assert_eq!(
            render_figures(text),
            "before\n<img src=\"data:image/png;base64,iVBORw0KGgo=\" alt=\"Plot\" />\nafter\n"
        );
    }

    #[test]
    fn many_markers_keep_their_order() {
        let text = "<matplotlib_figure>AAA</matplotlib_figure> mid <matplotlib_figure>BBB</matplotlib_figure>";
        let rendered = render_figures(text);
        let a = rendered.find("base64,AAA").unwrap();
        let b = rendered.find("base64,BBB").unwrap();
        assert!(a < b);
        assert!(rendered.contains(" mid "));
        assert!(!rendered.contains(FIGURE_START));
    }

    #[test]
    fn payload_may_span_lines() {
        let text = "<matplotlib_figure>AA\nBB</matplotlib_figure>";
        assert_eq!(
            render_figures(text),
            "<img src=\"data:image/png;base64,AA\nBB\" alt=\"Plot\" />"
        );
    }

    #[test]
    fn rendering_twice_is_a_no_op() {
        let once = render_figures("x <matplotlib_figure>QUJD</matplotlib_figure> y");
        assert_eq!(render_figures(&once), once);
    }

    #[test]
    fn unterminated_marker_is_left_alone() {
        let text = "<matplotlib_figure>QUJD";
        assert_eq!(render_figures(text), text);
    }

    #[test]
    fn runtime_annotation_uses_two_decimals() {
        assert_eq!(
            annotate_runtime("ok\n", 1.23456),
            "ok\n\n\n// Code executed in 1.23 seconds"
        );
    }
}
