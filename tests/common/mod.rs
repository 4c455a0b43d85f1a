#![allow(dead_code)]

use std::path::Path;

use tempfile::TempDir;

pub const MODULE: &str = "example.com/shop";

/// A throwaway Go module. The caller must hold onto the returned `TempDir`
/// to keep the directory alive.
pub struct GoModule {
    pub dir: TempDir,
}

impl GoModule {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("go.mod"),
            format!("module {MODULE}\n\ngo 1.22\n"),
        )
        .unwrap();
        Self { dir }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Write a repository-relative file, creating parent directories.
    pub fn write(&self, relative: &str, contents: &str) -> &Self {
        let path = self.root().join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, contents).unwrap();
        self
    }

    /// Write `coverage.out` from `(relative path, "sl.sc,el.ec n count")` rows.
    pub fn profile<F: AsRef<str>, B: AsRef<str>>(
        &self,
        mode: &str,
        blocks: &[(F, B)],
    ) -> std::path::PathBuf {
        let mut text = format!("mode: {mode}\n");
        for (file, block) in blocks {
            text.push_str(&format!("{MODULE}/{}:{}\n", file.as_ref(), block.as_ref()));
        }
        let path = self.root().join("coverage.out");
        std::fs::write(&path, text).unwrap();
        path
    }
}

/// pkg/cart/cart.go: two functions, one with an ignored error branch.
pub const CART_GO: &str = "package cart

type Cart struct {
\titems []int
}

func (c *Cart) Add(price int) error {
\tif price < 0 {
\t\t//+gocover:ignore:block negative prices are rejected upstream
\t\treturn errNegative
\t}
\tc.items = append(c.items, price)
\treturn nil
}

func (c *Cart) Total() int {
\tsum := 0
\tfor _, p := range c.items {
\t\tsum += p
\t}
\treturn sum
}
";

/// Blocks `go test -coverprofile` emits for `CART_GO`, as
/// `(start, end, statements)`; counts are supplied per test.
pub const CART_BLOCKS: [&str; 6] = [
    "7.37,8.15 1",
    "8.15,11.3 1",
    "12.2,13.12 2",
    "16.28,18.28 2",
    "18.28,20.3 1",
    "21.2,21.12 1",
];

pub fn cart_profile(counts: [u64; 6]) -> Vec<(&'static str, String)> {
    CART_BLOCKS
        .iter()
        .zip(counts)
        .map(|(block, count)| ("pkg/cart/cart.go", format!("{block} {count}")))
        .collect()
}
