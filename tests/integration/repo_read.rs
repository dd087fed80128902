//! Drives every facade operation against the on-disk fixture.

use std::path::Path;

use baregit::{ObjectError, ObjectKind, OpenError, Repository};

use crate::fixture::build_repo;

#[test]
fn open_nonexistent_directory_fails() {
    assert!(matches!(
        Repository::open(Path::new("xxxxxxxx")),
        Err(OpenError::PathNotFound)
    ));
}

#[test]
fn head_resolves_through_symref_chain() {
    let fx = build_repo();
    let repo = Repository::open(fx.path()).unwrap();

    let head = repo.lookup_reference("HEAD").unwrap();
    assert_eq!(head.name, "HEAD");
    assert_eq!(head.target, fx.commit_id);

    let branch = repo.lookup_reference("refs/heads/main").unwrap();
    assert_eq!(branch.target, fx.commit_id);
}

#[test]
fn packed_ref_resolves_from_list_file() {
    let fx = build_repo();
    let repo = Repository::open(fx.path()).unwrap();

    let tag = repo.lookup_reference("refs/tags/v0.1").unwrap();
    assert_eq!(tag.target, fx.tag_id);

    assert!(matches!(
        repo.lookup_reference("refs/tags/ghost"),
        Err(ObjectError::Ref(_))
    ));
}

#[test]
fn packed_commit_reads_back() {
    let fx = build_repo();
    let repo = Repository::open(fx.path()).unwrap();
    assert_eq!(repo.index_count(), 1);

    let obj = repo.raw_object(&fx.commit_id).unwrap();
    assert_eq!(obj.kind, ObjectKind::Commit);
    assert_eq!(obj.size, fx.commit_payload.len() as u64);
    assert_eq!(obj.data, fx.commit_payload);

    let prefix = format!("tree {}", fx.root_tree_id);
    assert!(obj.data.starts_with(prefix.as_bytes()));
}

#[test]
fn delta_tree_reconstructs() {
    let fx = build_repo();
    let repo = Repository::open(fx.path()).unwrap();

    let obj = repo.raw_object(&fx.delta_tree_id).unwrap();
    assert_eq!(obj.kind, ObjectKind::Tree);
    assert_eq!(obj.size, fx.delta_tree_payload.len() as u64);
    assert_eq!(obj.data, fx.delta_tree_payload);
    assert!(obj.data.starts_with(b"40000 dira"));
}

#[test]
fn size_and_kind_avoid_payloads() {
    let fx = build_repo();
    let repo = Repository::open(fx.path()).unwrap();

    // Stored pack object.
    assert_eq!(
        repo.object_size(&fx.packed_blob_id).unwrap(),
        fx.packed_blob_payload.len() as u64
    );
    assert_eq!(
        repo.object_kind(&fx.packed_blob_id).unwrap(),
        ObjectKind::Blob
    );

    // Delta object: the size is the reconstructed size, the kind is the
    // chain base's kind.
    assert_eq!(
        repo.object_size(&fx.delta_tree_id).unwrap(),
        fx.delta_tree_payload.len() as u64
    );
    assert_eq!(repo.object_kind(&fx.delta_tree_id).unwrap(), ObjectKind::Tree);

    // Loose object.
    assert_eq!(
        repo.object_size(&fx.loose_blob_id).unwrap(),
        fx.loose_blob_payload.len() as u64
    );
    assert_eq!(
        repo.object_kind(&fx.loose_blob_id).unwrap(),
        ObjectKind::Blob
    );
}

#[test]
fn loose_object_reads_back() {
    let fx = build_repo();
    let repo = Repository::open(fx.path()).unwrap();

    let obj = repo.raw_object(&fx.loose_blob_id).unwrap();
    assert_eq!(obj.kind, ObjectKind::Blob);
    assert_eq!(obj.data, fx.loose_blob_payload);
}

#[test]
fn commit_navigates_to_tree_entries() {
    let fx = build_repo();
    let repo = Repository::open(fx.path()).unwrap();

    let commit = repo.lookup_commit(&fx.commit_id).unwrap();
    assert_eq!(commit.tree_id(), &fx.root_tree_id);
    assert_eq!(commit.parent_count(), 0);
    assert_eq!(commit.author.name, "Ada Example");
    assert_eq!(commit.committer.timestamp, 1378823654);

    let raw_tree = repo.raw_object(commit.tree_id()).unwrap();
    assert_eq!(raw_tree.data, fx.root_tree_payload);

    let tree = repo.lookup_tree(commit.tree_id()).unwrap();
    assert_eq!(tree.len(), 7);
    assert_eq!(tree.entry_by_index(2).unwrap().name, b"dirc");
    assert_eq!(tree.entry_by_name(b"dirc").unwrap().name, b"dirc");
    assert!(tree.entry_by_name(b"doesnotexist").is_none());

    let file = tree.entry_by_name(b"file1.txt").unwrap();
    assert_eq!(file.id, fx.packed_blob_id);
    assert!(file.kind.is_file());
}

#[test]
fn delta_tree_decodes_like_any_tree() {
    let fx = build_repo();
    let repo = Repository::open(fx.path()).unwrap();

    let tree = repo.lookup_tree(&fx.delta_tree_id).unwrap();
    assert_eq!(tree.len(), 3);
    assert_eq!(tree.entry_by_index(0).unwrap().name, b"dira");
    assert_eq!(tree.entry_by_index(2).unwrap().name, b"extra.txt");
}

#[test]
fn unknown_id_is_not_found() {
    let fx = build_repo();
    let repo = Repository::open(fx.path()).unwrap();

    let ghost = baregit::ObjectId::from_raw([0xee; 20]);
    assert!(matches!(
        repo.raw_object(&ghost),
        Err(ObjectError::NotFound)
    ));
    assert!(matches!(
        repo.object_size(&ghost),
        Err(ObjectError::NotFound)
    ));
}

#[test]
fn kind_mismatch_is_reported() {
    let fx = build_repo();
    let repo = Repository::open(fx.path()).unwrap();

    assert!(matches!(
        repo.lookup_commit(&fx.packed_blob_id),
        Err(ObjectError::WrongKind {
            expected: ObjectKind::Commit,
            found: ObjectKind::Blob,
        })
    ));
    assert!(matches!(
        repo.lookup_tree(&fx.commit_id),
        Err(ObjectError::WrongKind {
            expected: ObjectKind::Tree,
            found: ObjectKind::Commit,
        })
    ));
}

#[test]
fn repository_is_shareable_across_threads() {
    let fx = build_repo();
    let repo = Repository::open(fx.path()).unwrap();

    std::thread::scope(|scope| {
        for _ in 0..4 {
            scope.spawn(|| {
                for _ in 0..8 {
                    let obj = repo.raw_object(&fx.delta_tree_id).unwrap();
                    assert_eq!(obj.data, fx.delta_tree_payload);
                    let obj = repo.raw_object(&fx.loose_blob_id).unwrap();
                    assert_eq!(obj.data, fx.loose_blob_payload);
                }
            });
        }
    });
}
