#![allow(dead_code)]

use std::{
    path::{Path, PathBuf},
    process::{Command, Output},
};

pub const CORPUS: &str = r#"[
  {"abbrev": "gn", "name": "Genesis", "chapters": [
    ["In the beginning God created the heaven and the earth.",
     "And the earth was without form, and void; and darkness was upon the face of the deep.",
     "And God said, Let there be light: and there was light."]
  ]},
  {"abbrev": "ps", "name": "Psalms", "chapters": [
    [],
    ["The LORD is my shepherd; I shall not want.",
     "He maketh me to lie down in green pastures: he leadeth me beside the still waters."]
  ]},
  {"abbrev": "jn", "name": "John", "chapters": [
    ["Jesus wept."]
  ]}
]"#;

pub fn versebert_bin() -> Result<PathBuf, Box<dyn std::error::Error>> {
    if let Ok(bin) = std::env::var("CARGO_BIN_EXE_versebert") {
        return Ok(PathBuf::from(bin));
    }

    let mut path = std::env::current_exe()?;
    path.pop();
    if path.ends_with("deps") {
        path.pop();
    }
    path.push("versebert");

    if cfg!(windows) {
        path.set_extension("exe");
    }

    Ok(path)
}

/// Run the binary against `data_dir` with a clean model environment.
pub fn run(
    data_dir: &Path,
    args: &[&str],
) -> Result<Output, Box<dyn std::error::Error>> {
    let output = Command::new(versebert_bin()?)
        .args(args)
        .env("VERSEBERT_DATA_DIR", data_dir)
        .env_remove("VERSEBERT_MODEL")
        .env("VERSEBERT_LOG", "warn")
        .output()?;
    Ok(output)
}

/// Write the fixture corpus and index it with the hash embedder.
pub fn build_fixture(
    data_dir: &Path,
    model: &str,
) -> Result<PathBuf, Box<dyn std::error::Error>> {
    let corpus = data_dir.join("corpus.json");
    std::fs::write(&corpus, CORPUS)?;

    let output = run(
        data_dir,
        &[
            "index",
            corpus.to_str().ok_or("non-utf8 path")?,
            "--model",
            model,
            "--no-progress",
        ],
    )?;
    assert!(
        output.status.success(),
        "index failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    Ok(corpus)
}
