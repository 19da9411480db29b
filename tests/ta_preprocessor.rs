use std::fs::{self, create_dir_all};
use std::path::Path;

use tempfile::tempdir;
use tx_manager::preprocess::do_preprocess;
use tx_manager::resource_container::ResourceContainer;

fn write(path: &Path, content: &str) {
    if let Some(parent) = path.parent() {
        create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
}

fn write_ta_manifest(dir: &Path, projects: &[(&str, &str)]) {
    let mut manifest = concat!(
        "resource:\n",
        "  identifier: ta\n",
        "  title: translationAcademy\n",
        "  file_ext: md\n",
        "  language:\n",
        "    identifier: en\n",
        "    title: English\n",
        "    direction: ltr\n",
        "projects:\n",
    )
    .to_string();
    for (id, path) in projects {
        manifest.push_str(&format!("  - identifier: {id}\n    path: {path}\n"));
    }
    write(&dir.join("manifest.yaml"), &manifest);
}

/// One manual with a container section holding two linked topics.
fn write_translate_manual(dir: &Path) {
    write(
        &dir.join("translate/toc.yaml"),
        concat!(
            "title: Translation Manual Table of Contents\n",
            "sections:\n",
            "  - title: Introduction\n",
            "    sections:\n",
            "      - title: Introduction to the Translation Manual\n",
            "        link: translate-intro\n",
            "      - title: Figures of Speech\n",
            "        link: figs-intro\n",
        ),
    );
    write(
        &dir.join("translate/config.yaml"),
        concat!(
            "translate-intro:\n",
            "  dependencies: []\n",
            "  recommended:\n",
            "    - figs-intro\n",
            "figs-intro:\n",
            "  dependencies:\n",
            "    - translate-intro\n",
            "  recommended: []\n",
        ),
    );
    write(
        &dir.join("translate/translate-intro/title.md"),
        "Introduction to the Translation Manual\n",
    );
    write(
        &dir.join("translate/translate-intro/sub-title.md"),
        "What is the Translation Manual?\n",
    );
    write(
        &dir.join("translate/translate-intro/01.md"),
        "This manual teaches translation.\n\nSee [Figures](../figs-intro/01.md) for more.\n",
    );
    write(&dir.join("translate/figs-intro/title.md"), "Figures of Speech\n");
    write(
        &dir.join("translate/figs-intro/01.md"),
        "Figures of speech have special meanings.\n",
    );
}

#[test]
fn test_manual_compiles_with_anchors_and_boxes() {
    let src = tempdir().unwrap();
    let out = tempdir().unwrap();
    write_ta_manifest(src.path(), &[("translate", "./translate")]);
    write_translate_manual(src.path());

    let rc = ResourceContainer::from_dir(src.path()).unwrap();
    let (success, _) = do_preprocess(rc, src.path(), out.path()).unwrap();
    assert!(success);

    let markdown = fs::read_to_string(out.path().join("01-translate.md")).unwrap();

    assert!(markdown.starts_with("# Translation Manual\n\n"));
    // The container node minted a synthetic anchor at level 2.
    assert!(markdown.contains("## <a id=\"section-container-1\"/>Introduction\n"));
    // Linked sections sit one level deeper, titled from title.md.
    assert!(
        markdown.contains("### <a id=\"translate-intro\"/>Introduction to the Translation Manual\n")
    );
    assert!(markdown.contains("### <a id=\"figs-intro\"/>Figures of Speech\n"));
    // sub-title.md feeds the question box.
    assert!(markdown
        .contains("This page answers the question: *What is the Translation Manual?*"));
    // Same-project references resolve to local anchors in both boxes.
    assert!(markdown.contains("Next we recommend you learn about:"));
    assert!(markdown.contains("  * *[Figures of Speech](#figs-intro)*"));
    assert!(markdown.contains("In order to understand this topic, it would be good to read:"));
    assert!(markdown
        .contains("  * *[Introduction to the Translation Manual](#translate-intro)*"));
    // Sections close with a horizontal rule.
    assert!(markdown.contains("---\n\n"));
}

#[test]
fn test_intra_manual_links_become_anchors() {
    let src = tempdir().unwrap();
    let out = tempdir().unwrap();
    write_ta_manifest(src.path(), &[("translate", "./translate")]);
    write_translate_manual(src.path());

    let rc = ResourceContainer::from_dir(src.path()).unwrap();
    do_preprocess(rc, src.path(), out.path()).unwrap();

    let markdown = fs::read_to_string(out.path().join("01-translate.md")).unwrap();
    assert!(markdown.contains("[Figures](#figs-intro)"));
    assert!(!markdown.contains("../figs-intro/01.md"));
}

#[test]
fn test_cross_manual_links_get_ordinal_page_reference() {
    let src = tempdir().unwrap();
    let out = tempdir().unwrap();
    write_ta_manifest(
        src.path(),
        &[("translate", "./translate"), ("checking", "./checking")],
    );
    write_translate_manual(src.path());
    write(
        &src.path().join("checking/toc.yaml"),
        concat!(
            "title: Checking Manual Table of Contents\n",
            "sections:\n",
            "  - title: Checking Intro\n",
            "    link: intro-check\n",
        ),
    );
    write(
        &src.path().join("checking/config.yaml"),
        "intro-check:\n  dependencies: []\n  recommended: []\n",
    );
    write(
        &src.path().join("checking/intro-check/01.md"),
        "Before checking, read [the intro](../../translate/translate-intro/01.md).\n",
    );

    let rc = ResourceContainer::from_dir(src.path()).unwrap();
    do_preprocess(rc, src.path(), out.path()).unwrap();

    let markdown = fs::read_to_string(out.path().join("02-checking.md")).unwrap();
    assert!(markdown.starts_with("# Checking Manual\n\n"));
    assert!(markdown.contains("[the intro](01-translate.html#translate-intro)"));
}

#[test]
fn test_rc_scheme_and_bare_urls_are_rewritten() {
    let src = tempdir().unwrap();
    let out = tempdir().unwrap();
    write_ta_manifest(src.path(), &[("translate", "./translate")]);
    write(
        &src.path().join("translate/toc.yaml"),
        "title: toc\nsections:\n  - title: Links\n    link: links-topic\n",
    );
    write(
        &src.path().join("translate/config.yaml"),
        "links-topic:\n  dependencies: []\n  recommended: []\n",
    );
    write(
        &src.path().join("translate/links-topic/01.md"),
        concat!(
            "See rc://en/tn/help/1sa/16/02 for notes.\n\n",
            "Also see www.example.com and [Verbs](#figs-verb) stays.\n",
        ),
    );

    let rc = ResourceContainer::from_dir(src.path()).unwrap();
    do_preprocess(rc, src.path(), out.path()).unwrap();

    let markdown = fs::read_to_string(out.path().join("01-translate.md")).unwrap();
    // rc:// resolves to the external repository, then the bare URL is
    // auto-linked.
    assert!(markdown.contains(
        "[https://git.door43.org/Door43/en_tn/src/master/1sa/16/02.md](https://git.door43.org/Door43/en_tn/src/master/1sa/16/02.md)"
    ));
    // Bare www URLs are linked with an http scheme.
    assert!(markdown.contains("[www.example.com](http://www.example.com)"));
    // Already-canonical anchors are untouched by the rewrite passes.
    assert!(markdown.contains("[Verbs](#figs-verb)"));
}

#[test]
fn test_unknown_manual_gets_humanized_title_and_slug_fallback() {
    let src = tempdir().unwrap();
    let out = tempdir().unwrap();
    write_ta_manifest(src.path(), &[("audio", "./audio")]);
    write(
        &src.path().join("audio/toc.yaml"),
        "title: toc\nsections:\n  - link: recording-basics\n",
    );
    // No config.yaml and no title.md anywhere: the slug humanizes.
    create_dir_all(src.path().join("audio/recording-basics")).unwrap();

    let rc = ResourceContainer::from_dir(src.path()).unwrap();
    do_preprocess(rc, src.path(), out.path()).unwrap();

    let markdown = fs::read_to_string(out.path().join("01-audio.md")).unwrap();
    assert!(markdown.starts_with("# Audio Manual\n\n"));
    assert!(markdown.contains("## <a id=\"recording-basics\"/>Recording Basics\n"));
}

#[test]
fn test_raw_toc_and_config_are_copied_alongside() {
    let src = tempdir().unwrap();
    let out = tempdir().unwrap();
    write_ta_manifest(src.path(), &[("translate", "./translate")]);
    write_translate_manual(src.path());

    let rc = ResourceContainer::from_dir(src.path()).unwrap();
    do_preprocess(rc, src.path(), out.path()).unwrap();

    assert!(out.path().join("01-translate-toc.yaml").is_file());
    assert!(out.path().join("01-translate-config.yaml").is_file());
}
