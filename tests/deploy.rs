//! Integration tests exercising the deployment engine against a throwaway
//! `ostree::Repo`: a commit whose root tree contains `files/`, `export/`,
//! and `metadata` entries, checked out through `deploy`/`undeploy`/
//! `list_deployed`.

use std::os::unix::io::AsRawFd;

use camino::Utf8PathBuf;
use depotcore::cancel::Cancellable;
use depotcore::deploy::Engine;
use depotcore::overrides::Scope;
use depotcore::progress::NoProgress;
use depotcore::refs::{Kind, Ref};

/// Build a local commit in `engine`'s repo from a plain directory tree,
/// returning its checksum. The source tree is expected to already contain
/// whatever `files/`, `export/`, `metadata` entries the test wants to see
/// in the resulting deployment.
fn commit_tree(engine: &Engine, srcdir: &Utf8PathBuf) -> String {
    let repo = engine.repo().inner();
    let cancellable = ostree::gio::Cancellable::NONE;
    let tx = repo.auto_transaction(cancellable).unwrap();

    let dfd = cap_std_ext::cap_std::fs::Dir::open_ambient_dir(
        srcdir,
        cap_std_ext::cap_std::ambient_authority(),
    )
    .unwrap();
    let mt = ostree::MutableTree::new();
    repo.write_dfd_to_mtree(dfd.as_raw_fd(), ".", &mt, None, cancellable)
        .unwrap();
    let root = repo.write_mtree(&mt, cancellable).unwrap();
    let root = root.downcast_ref::<ostree::RepoFile>().unwrap();

    let checksum = repo
        .write_commit_with_time(None, None, None, None, root, 1_000_000_000, cancellable)
        .unwrap();
    tx.commit(cancellable).unwrap();
    checksum.to_string()
}

fn make_ref() -> Ref {
    Ref {
        kind: Kind::App,
        name: "org.example.App".into(),
        arch: "x86_64".into(),
        branch: "stable".into(),
    }
}

fn write_basic_tree(srcdir: &Utf8PathBuf, exec_line: &str) {
    std::fs::create_dir_all(srcdir.join("files/bin")).unwrap();
    std::fs::write(srcdir.join("files/bin/app"), b"#!/bin/sh\necho hi\n").unwrap();
    std::fs::write(srcdir.join("metadata"), b"[Application]\nname=org.example.App\n").unwrap();
    std::fs::create_dir_all(srcdir.join("export/share/applications")).unwrap();
    std::fs::write(
        srcdir.join("export/share/applications/org.example.App.desktop"),
        format!("[Desktop Entry]\nType=Application\nName=Example\nExec={exec_line}\n"),
    )
    .unwrap();
}

#[test]
fn fresh_install_sets_active_and_lock_anchor() {
    let tmp = tempfile::tempdir().unwrap();
    let base = Utf8PathBuf::from_path_buf(tmp.path().join("install")).unwrap();
    let engine = Engine::open(&base, Scope::User).unwrap();

    let srctmp = tempfile::tempdir().unwrap();
    let srcdir = Utf8PathBuf::from_path_buf(srctmp.path().to_owned()).unwrap();
    write_basic_tree(&srcdir, "gedit %U");
    let checksum = commit_tree(&engine, &srcdir);

    let r = make_ref();
    let deployed = engine
        .deploy(&r, Some(&checksum), &NoProgress, &Cancellable::new())
        .unwrap();
    assert_eq!(deployed, checksum);

    assert_eq!(engine.read_active(&r), Some(checksum.clone()));
    assert_eq!(engine.list_deployed(&r).unwrap(), vec![checksum.clone()]);

    let deployment = depotcore::refs::deployment_dir(&base, &r, &checksum);
    assert!(depotcore::refs::deployment_lock_file(&deployment).is_file());

    // The exported .desktop file was rewritten to launch under the sandbox.
    let rewritten = std::fs::read_to_string(
        deployment
            .join("export/share/applications/org.example.App.desktop"),
    )
    .unwrap();
    assert!(rewritten.contains("Exec=/usr/bin/launch --branch=stable --arch=x86_64 --command=gedit org.example.App %U"));
    assert!(!rewritten.contains("TryExec"));
}

#[test]
fn second_install_repoints_active_first_stays_listed() {
    let tmp = tempfile::tempdir().unwrap();
    let base = Utf8PathBuf::from_path_buf(tmp.path().join("install")).unwrap();
    let engine = Engine::open(&base, Scope::User).unwrap();
    let r = make_ref();

    let srctmp1 = tempfile::tempdir().unwrap();
    let srcdir1 = Utf8PathBuf::from_path_buf(srctmp1.path().to_owned()).unwrap();
    write_basic_tree(&srcdir1, "gedit %U");
    let c1 = commit_tree(&engine, &srcdir1);
    engine
        .deploy(&r, Some(&c1), &NoProgress, &Cancellable::new())
        .unwrap();

    let srctmp2 = tempfile::tempdir().unwrap();
    let srcdir2 = Utf8PathBuf::from_path_buf(srctmp2.path().to_owned()).unwrap();
    std::fs::create_dir_all(srcdir2.join("files")).unwrap();
    std::fs::write(srcdir2.join("files/marker"), b"v2").unwrap();
    std::fs::write(srcdir2.join("metadata"), b"[Application]\nname=org.example.App\n").unwrap();
    let c2 = commit_tree(&engine, &srcdir2);
    engine
        .deploy(&r, Some(&c2), &NoProgress, &Cancellable::new())
        .unwrap();

    assert_eq!(engine.read_active(&r), Some(c2.clone()));
    let mut deployed = engine.list_deployed(&r).unwrap();
    deployed.sort();
    let mut expected = vec![c1.clone(), c2.clone()];
    expected.sort();
    similar_asserts::assert_eq!(deployed, expected);

    // Re-deploying the same checksum a second time is rejected.
    let err = engine
        .deploy(&r, Some(&c2), &NoProgress, &Cancellable::new())
        .unwrap_err();
    assert_eq!(err.kind(), depotcore::error::ErrorKind::AlreadyDeployed);
}

#[test]
fn undeploy_non_active_checksum_leaves_active_alone() {
    let tmp = tempfile::tempdir().unwrap();
    let base = Utf8PathBuf::from_path_buf(tmp.path().join("install")).unwrap();
    let engine = Engine::open(&base, Scope::User).unwrap();
    let r = make_ref();

    let srctmp1 = tempfile::tempdir().unwrap();
    let srcdir1 = Utf8PathBuf::from_path_buf(srctmp1.path().to_owned()).unwrap();
    write_basic_tree(&srcdir1, "gedit %U");
    let c1 = commit_tree(&engine, &srcdir1);
    engine
        .deploy(&r, Some(&c1), &NoProgress, &Cancellable::new())
        .unwrap();

    let srctmp2 = tempfile::tempdir().unwrap();
    let srcdir2 = Utf8PathBuf::from_path_buf(srctmp2.path().to_owned()).unwrap();
    std::fs::create_dir_all(srcdir2.join("files")).unwrap();
    std::fs::write(srcdir2.join("files/marker"), b"v2").unwrap();
    let c2 = commit_tree(&engine, &srcdir2);
    engine
        .deploy(&r, Some(&c2), &NoProgress, &Cancellable::new())
        .unwrap();

    // c1 is not active (c2 is, since it was deployed second); undeploying
    // it must not disturb `active`, and the checkout is quarantined then
    // deleted since nothing holds its lock.
    engine.undeploy(&r, &c1, false).unwrap();
    assert_eq!(engine.read_active(&r), Some(c2));
    assert_eq!(engine.list_deployed(&r).unwrap(), vec![engine.read_active(&r).unwrap()]);

    let deployment = depotcore::refs::deployment_dir(&base, &r, &c1);
    assert!(!deployment.exists());

    // Undeploying again fails: there's no checkout left for c1.
    let err = engine.undeploy(&r, &c1, false).unwrap_err();
    assert_eq!(err.kind(), depotcore::error::ErrorKind::AlreadyUndeployed);
}

#[test]
fn undeploy_active_repoints_to_remaining_deployment() {
    let tmp = tempfile::tempdir().unwrap();
    let base = Utf8PathBuf::from_path_buf(tmp.path().join("install")).unwrap();
    let engine = Engine::open(&base, Scope::User).unwrap();
    let r = make_ref();

    let srctmp1 = tempfile::tempdir().unwrap();
    let srcdir1 = Utf8PathBuf::from_path_buf(srctmp1.path().to_owned()).unwrap();
    write_basic_tree(&srcdir1, "gedit %U");
    let c1 = commit_tree(&engine, &srcdir1);
    engine
        .deploy(&r, Some(&c1), &NoProgress, &Cancellable::new())
        .unwrap();

    let srctmp2 = tempfile::tempdir().unwrap();
    let srcdir2 = Utf8PathBuf::from_path_buf(srctmp2.path().to_owned()).unwrap();
    std::fs::create_dir_all(srcdir2.join("files")).unwrap();
    std::fs::write(srcdir2.join("files/marker"), b"v2").unwrap();
    let c2 = commit_tree(&engine, &srcdir2);
    engine
        .deploy(&r, Some(&c2), &NoProgress, &Cancellable::new())
        .unwrap();

    // c2 is active; undeploying it must repoint active at the only
    // remaining deployment, c1, and never leave it as c2.
    engine.undeploy(&r, &c2, false).unwrap();
    let active = engine.read_active(&r);
    assert_eq!(active, Some(c1));
}

#[test]
fn make_current_publishes_exports() {
    let tmp = tempfile::tempdir().unwrap();
    let base = Utf8PathBuf::from_path_buf(tmp.path().join("install")).unwrap();
    let engine = Engine::open(&base, Scope::User).unwrap();
    let r = make_ref();

    let srctmp = tempfile::tempdir().unwrap();
    let srcdir = Utf8PathBuf::from_path_buf(srctmp.path().to_owned()).unwrap();
    write_basic_tree(&srcdir, "gedit %U");
    let checksum = commit_tree(&engine, &srcdir);
    engine
        .deploy(&r, Some(&checksum), &NoProgress, &Cancellable::new())
        .unwrap();

    engine.make_current(&r).unwrap();

    let published = base.join("exports/share/applications/org.example.App.desktop");
    let target = std::fs::read_link(published.as_std_path()).unwrap();
    assert!(target.to_string_lossy().ends_with(
        "app/org.example.App/current/active/export/share/applications/org.example.App.desktop"
    ));
    let contents = std::fs::read_to_string(published.as_std_path()).unwrap();
    assert!(contents.contains("--command=gedit"));
}
