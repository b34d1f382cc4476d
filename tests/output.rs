use benchrun::output::HumanOutput;

#[test]
fn render_includes_sections() {
    let mut human = HumanOutput::new("benchrun run: baseline");
    human.push_summary("completed", 3);
    human.push_summary("predictions", "/tmp/runs/baseline/predictions.jsonl");
    human.push_detail("workdir kept");
    human.push_warning("t2: No output produced");
    human.push_next_step("benchrun harvest --run baseline");

    let rendered = human.render();
    assert!(rendered.starts_with("benchrun run: baseline"));
    assert!(rendered.contains("completed    3"));
    assert!(rendered.contains("Details:"));
    assert!(rendered.contains("  - workdir kept"));
    assert!(rendered.contains("Warnings:"));
    assert!(rendered.contains("  - t2: No output produced"));
    assert!(rendered.contains("Next steps:"));
    assert!(rendered.contains("  - benchrun harvest --run baseline"));
}

#[test]
fn render_omits_empty_sections() {
    let human = HumanOutput::new("benchrun init: config already exists, nothing to do");
    assert_eq!(
        human.render(),
        "benchrun init: config already exists, nothing to do"
    );
}
