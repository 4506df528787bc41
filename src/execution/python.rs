//! Python source preparation: guard fix-up, recursion cap and plot capture.

use super::output::{FIGURE_END, FIGURE_START};

const PYPLOT_IMPORTS: [&str; 2] = [
    "import matplotlib.pyplot as plt",
    "from matplotlib import pyplot as plt",
];

/// Rewrites validated source before it is written to disk. Pure text.
pub fn prepare(code: &str, recursion_limit: u32) -> String {
    let fixed = code.replace("if **name** ==", "if __name__ ==");

    let mut prepared = format!(
        "# Import sandbox configuration\nimport sys\nsys.setrecursionlimit({recursion_limit})\n\n{fixed}"
    );

    if uses_pyplot(code) {
        // Only the first import line gets the hook, ahead of any user `show`.
        if let Some(import) = PYPLOT_IMPORTS.iter().find(|i| prepared.contains(*i)) {
            let hooked = format!("{import}\n{}", figure_capture());
            prepared = prepared.replacen(import, &hooked, 1);
        }
    }

    prepared
}

fn uses_pyplot(code: &str) -> bool {
    PYPLOT_IMPORTS.iter().any(|i| code.contains(i))
        || code.contains("matplotlib.pyplot")
        || code.contains("import plt")
}

/// Selects the Agg backend and swaps `plt.show` for a version that prints the
/// current figure as base64 PNG between figure markers.
fn figure_capture() -> String {
    format!(
        r#"
import io
import base64
import matplotlib
matplotlib.use('Agg')  # Use non-interactive backend
from matplotlib import pyplot as plt

# Store the original plt.show function
original_plt_show = plt.show

# Override plt.show to capture the image data
def custom_plt_show(*args, **kwargs):
    buf = io.BytesIO()
    plt.savefig(buf, format='png', dpi=80, bbox_inches='tight')
    buf.seek(0)
    img_base64 = base64.b64encode(buf.read()).decode('utf-8')
    print(f"{FIGURE_START}{{img_base64}}{FIGURE_END}")
    plt.close()

# Replace plt.show with our custom function
plt.show = custom_plt_show
"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prepends_recursion_limit() {
        let out = prepare("print(1)", 1000);
        assert!(out.starts_with("# Import sandbox configuration\nimport sys\nsys.setrecursionlimit(1000)\n\n"));
        assert!(out.ends_with("print(1)"));
    }

    #[test]
    fn fixes_mangled_main_guard() {
        let out = prepare("if **name** == '__main__':\n    main()", 1000);
        assert!(out.contains("if __name__ == '__main__':"));
        assert!(!out.contains("**name**"));
    }

    #[test]
    fn leaves_plain_code_without_capture() {
        let out = prepare("import numpy as np\nprint(np.pi)", 1000);
        assert!(!out.contains("custom_plt_show"));
    }

    #[test]
    fn injects_capture_right_after_pyplot_import() {
        let code = "import matplotlib.pyplot as plt\nplt.plot([1, 2])\nplt.show()\n";
        let out = prepare(code, 1000);
        let import_at = out.find("import matplotlib.pyplot as plt").unwrap();
        let hook_at = out.find("plt.show = custom_plt_show").unwrap();
        let user_show = out.rfind("plt.show()").unwrap();
        assert!(import_at < hook_at && hook_at < user_show);
        assert!(out.contains("matplotlib.use('Agg')"));
        assert!(out.contains(r#"print(f"<matplotlib_figure>{img_base64}</matplotlib_figure>")"#));
    }

    #[test]
    fn supports_from_import_spelling() {
        let code = "from matplotlib import pyplot as plt\nplt.show()\n";
        let out = prepare(code, 1000);
        assert_eq!(out.matches("plt.show = custom_plt_show").count(), 1);
        let import_at = out.find("from matplotlib import pyplot as plt\n").unwrap();
        let hook_at = out.find("plt.show = custom_plt_show").unwrap();
        assert!(import_at < hook_at && hook_at < out.rfind("plt.show()").unwrap());
        assert!(out.contains("matplotlib.use('Agg')"));
    }

    #[test]
    fn hooks_only_the_first_import() {
        let code = "import matplotlib.pyplot as plt\nimport matplotlib.pyplot as plt\nplt.show()\n";
        let out = prepare(code, 1000);
        assert_eq!(out.matches("def custom_plt_show").count(), 1);
    }

    #[test]
    fn unknown_import_spelling_is_not_hooked() {
        let code = "import matplotlib.pyplot as mpl\nmpl.show()\n";
        let out = prepare(code, 1000);
        assert!(!out.contains("custom_plt_show"));
    }
}
