use archscope::utils::{file_walker, project_root, table};
use std::fs;
use std::io::Write;
use tempfile::tempdir;

#[test]
fn table_renderer_produces_expected_grid() {
    let headers = ["A", "B"];
    let rows = vec![vec!["x".into(), "y".into()], vec!["long".into()]];
    let out = table::render(&headers, &rows);
    let lines: Vec<&str> = out.lines().collect();
    assert!(out.starts_with('+'));
    assert_eq!(lines[0], "+------+---+");
    assert_eq!(lines[1], "| A    | B |");
    // Short rows are padded
    assert_eq!(lines[4], "| long |   |");
    assert!(lines.iter().all(|l| l.chars().count() == lines[0].chars().count()));
}

#[test]
fn file_walker_respects_ignore_and_no_ignore() {
    let dir = tempdir().unwrap();
    let root = dir.path();
    write(&root.join("src/a.py.facts.json"), "{}");
    write(&root.join("src/b.py.facts.json"), "{}");
    write(&root.join("src/b.py"), "pass\n");
    write(&root.join(".facts.json"), "{}");
    write(&root.join(".gitignore"), "src/b.py.facts.json\n");

    let files = file_walker::fact_files(root, ".facts.json", false);
    assert_eq!(files.len(), 1);
    assert!(files[0].ends_with("src/a.py.facts.json"));

    let all = file_walker::fact_files(root, ".facts.json", true);
    assert_eq!(all.len(), 2);
    assert!(all[0] < all[1]);
}

#[test]
fn project_root_detects_nearest_marker() {
    let dir = tempdir().unwrap();
    let root = dir.path().join("proj");
    let deep = root.join("pkg/sub");
    fs::create_dir_all(&deep).unwrap();
    write(&root.join("pyproject.toml"), "[project]\nname = \"proj\"\n");

    assert_eq!(project_root::detect(Some(&deep)), root);
    assert_eq!(project_root::effective_path_opt(Some(&deep)), deep);
}

fn write(path: &std::path::Path, s: &str) {
    if let Some(parent) = path.parent() {
        let _ = fs::create_dir_all(parent);
    }
    let mut f = fs::File::create(path).unwrap();
    f.write_all(s.as_bytes()).unwrap();
}
