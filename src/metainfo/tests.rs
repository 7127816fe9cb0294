use super::*;
use crate::bencode::{encode, Value};
use crate::fs::{FileAttributes, FileDirLike, MemoryDirectory, MemoryFile};
use bytes::Bytes;

#[test]
fn test_info_hash_from_hex() {
    let hex = "0123456789abcdef0123456789abcdef01234567";
    let hash = InfoHash::from_hex(hex).unwrap();
    assert!(hash.is_v1());
    assert_eq!(hash.to_hex(), hex);
    assert_eq!(hash.to_string(), hex);
}

#[test]
fn test_info_hash_v2() {
    let hex = "0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef";
    let hash = InfoHash::from_hex(hex).unwrap();
    assert!(hash.is_v2());
    assert_eq!(hash.v1(), None);
    assert_eq!(hash.to_hex(), hex);
}

#[test]
fn test_info_hash_rejects_bad_hex() {
    assert!(matches!(
        InfoHash::from_hex("abcd"),
        Err(MetainfoError::InvalidInfoHashLength)
    ));
    assert!(InfoHash::from_hex("zz23456789abcdef0123456789abcdef01234567").is_err());
    assert!(InfoHash::from_hex("é123456789abcdef0123456789abcdef0123456").is_err());
    assert!(InfoHash::from_hex(&"+f".repeat(20)).is_err());
    assert!(InfoHash::from_hex(&"-1".repeat(20)).is_err());
    assert!(InfoHash::from_v1_bytes(&[0u8; 32]).is_err());
}

#[test]
fn test_info_hash_hybrid_prefers_v1() {
    let hash = InfoHash::compute(b"d4:name1:xe", TorrentVersion::Hybrid);
    assert!(hash.is_hybrid());
    assert_eq!(hash.as_bytes().len(), 20);
    assert_eq!(hash.v2().map(|v2| v2.len()), Some(32));

    let v2_only = InfoHash::compute(b"d4:name1:xe", TorrentVersion::V2);
    assert_eq!(v2_only.v2(), hash.v2());
    assert!(format!("{:?}", hash).starts_with("InfoHash("));
}

fn names(tree: &FileTree, id: NodeId) -> Vec<&str> {
    tree.children(id).iter().map(|&child| tree.name(child)).collect()
}

fn file_paths(tree: &FileTree) -> Vec<String> {
    tree.files().map(|(id, _, _)| tree.path(id).join("/")).collect()
}

#[tokio::test]
async fn test_file_tree_merges_raw_paths() {
    let tree = FileTree::build(
        vec![
            MemoryFile::at_path("docs/b.txt", "bb").into(),
            MemoryFile::at_path("docs/a.txt", "a").into(),
            MemoryFile::new("top.txt", "top").into(),
        ],
        true,
    )
    .await
    .unwrap();

    assert_eq!(tree.file_count(), 3);
    assert_eq!(tree.total_size(), 6);
    assert_eq!(file_paths(&tree), ["docs/a.txt", "docs/b.txt", "top.txt"]);
    assert_eq!(tree.single_root_entry(), None);
}

#[tokio::test]
async fn test_file_tree_sorts_by_bytes() {
    let tree = FileTree::build(
        vec![
            MemoryFile::new("b", "").into(),
            MemoryFile::new("a", "").into(),
            MemoryFile::new("B", "").into(),
        ],
        true,
    )
    .await
    .unwrap();
    assert_eq!(names(&tree, tree.root()), ["B", "a", "b"]);
}

#[tokio::test]
async fn test_file_tree_unsorted_keeps_arrival_order() {
    let tree = FileTree::build(
        vec![
            MemoryFile::new("zeta", "").into(),
            MemoryFile::new("alpha", "").into(),
            MemoryFile::new("mid", "").into(),
        ],
        false,
    )
    .await
    .unwrap();
    assert!(!tree.is_sorted());
    assert_eq!(names(&tree, tree.root()), ["zeta", "alpha", "mid"]);
}

#[tokio::test]
async fn test_file_tree_same_handle_twice_is_deduplicated() {
    let dir = MemoryDirectory::new("docs")
        .with_file(MemoryFile::new("a.txt", "aaa"))
        .with_file(MemoryFile::new("b.txt", "b"));

    let tree = FileTree::build(vec![dir.clone().into(), dir.into()], true)
        .await
        .unwrap();
    assert_eq!(tree.file_count(), 2);
    assert_eq!(tree.total_size(), 4);
}

#[tokio::test]
async fn test_file_tree_same_raw_file_twice_is_deduplicated() {
    let plain = MemoryFile::new("a.bin", vec![0u8; 10]);
    let nested = MemoryFile::at_path("dir/b.bin", vec![0u8; 7]);
    let tree = FileTree::build(
        vec![
            plain.clone().into(),
            nested.clone().into(),
            plain.into(),
            nested.into(),
        ],
        true,
    )
    .await
    .unwrap();

    assert_eq!(tree.file_count(), 2);
    assert_eq!(tree.total_size(), 17);
    assert_eq!(file_paths(&tree), ["a.bin", "dir/b.bin"]);
}

#[tokio::test]
async fn test_file_tree_same_file_handle_twice_is_deduplicated() {
    let file = MemoryFile::new("a.bin", vec![0u8; 10]);
    let tree = FileTree::build(
        vec![
            FileDirLike::file_handle(file.clone()),
            FileDirLike::file_handle(file),
        ],
        true,
    )
    .await
    .unwrap();
    assert_eq!(tree.file_count(), 1);
    assert_eq!(tree.total_size(), 10);
}

#[tokio::test]
async fn test_file_tree_rejects_different_handles_with_one_name() {
    let result = FileTree::build(
        vec![
            MemoryDirectory::new("docs").into(),
            MemoryDirectory::new("docs").into(),
        ],
        true,
    )
    .await;
    assert!(matches!(result, Err(FileTreeError::HandleMismatch { name }) if name == "docs"));

    let result = FileTree::build(
        vec![
            FileDirLike::file_handle(MemoryFile::new("a", "1")),
            FileDirLike::file_handle(MemoryFile::new("a", "1")),
        ],
        true,
    )
    .await;
    assert!(matches!(result, Err(FileTreeError::HandleMismatch { .. })));
}

#[tokio::test]
async fn test_file_tree_collision_file_then_directory() {
    let result = FileTree::build(
        vec![
            MemoryFile::new("x", "file").into(),
            MemoryFile::at_path("x/inner", "nested").into(),
        ],
        true,
    )
    .await;
    assert!(matches!(
        result,
        Err(FileTreeError::NameCollision {
            existing: NodeKind::File,
            ..
        })
    ));
}

#[tokio::test]
async fn test_file_tree_collision_directory_then_file() {
    let result = FileTree::build(
        vec![
            MemoryDirectory::new("x")
                .with_file(MemoryFile::new("inner", "nested"))
                .into(),
            MemoryFile::new("x", "file").into(),
        ],
        false,
    )
    .await;
    match result {
        Err(FileTreeError::NameCollision { name, existing }) => {
            assert_eq!(name, "x");
            assert_eq!(existing, NodeKind::Directory);
        }
        other => panic!("expected a collision, got {:?}", other),
    }
}

#[tokio::test]
async fn test_file_tree_raw_files_merge_into_handle_directory() {
    let dir = MemoryDirectory::new("docs").with_file(MemoryFile::new("a.txt", "a"));
    let tree = FileTree::build(
        vec![dir.into(), MemoryFile::at_path("docs/c.txt", "c").into()],
        true,
    )
    .await
    .unwrap();
    assert_eq!(file_paths(&tree), ["docs/a.txt", "docs/c.txt"]);
}

#[tokio::test]
async fn test_file_tree_raw_path_is_relative_to_its_directory() {
    let dir = MemoryDirectory::new("outer").with_file(MemoryFile::at_path("sub/f.txt", "f"));
    let tree = FileTree::build(vec![dir.into()], true).await.unwrap();
    assert_eq!(file_paths(&tree), ["outer/sub/f.txt"]);
}

#[tokio::test]
async fn test_file_tree_rejects_empty_segments() {
    for path in ["a//b", "/a", "a/"] {
        let result = FileTree::build(vec![MemoryFile::at_path(path, "x").into()], true).await;
        assert!(
            matches!(result, Err(FileTreeError::EmptyPathSegment(ref p)) if p == path),
            "{path}"
        );
    }
}

#[tokio::test]
async fn test_file_tree_reads_directory_entries_in_pages() {
    let mut dir = MemoryDirectory::new("paged").with_page_size(2);
    for i in 0..5 {
        dir = dir.with_file(MemoryFile::new(format!("f{i}"), vec![0u8; i]));
    }
    let tree = FileTree::build(vec![FileDirLike::directory_entry(dir)], true)
        .await
        .unwrap();

    assert_eq!(tree.file_count(), 5);
    assert_eq!(tree.total_size(), 10);
    let paged = tree.single_root_entry().unwrap();
    assert_eq!(names(&tree, paged), ["f0", "f1", "f2", "f3", "f4"]);
}

#[tokio::test]
async fn test_file_tree_file_entries() {
    let tree = FileTree::build(
        vec![
            FileDirLike::file_entry(MemoryFile::new("e", "entry")),
            FileDirLike::file_entry(MemoryFile::new("e", "other")),
        ],
        true,
    )
    .await
    .unwrap();
    assert_eq!(tree.file_count(), 1);
    assert_eq!(tree.total_size(), 5);
}

#[tokio::test]
async fn test_file_tree_deep_nesting() {
    let mut dir = MemoryDirectory::new("d0").with_file(MemoryFile::new("leaf", "x"));
    for depth in 1..2000 {
        dir = MemoryDirectory::new(format!("d{depth}")).with_dir(dir);
    }
    let tree = FileTree::build(vec![dir.into()], true).await.unwrap();

    assert_eq!(tree.file_count(), 1);
    let (id, _, _) = tree.files().next().unwrap();
    assert_eq!(tree.path(id).len(), 2001);
    assert_eq!(tree.path(id).last(), Some(&"leaf"));
}

#[tokio::test]
async fn test_file_tree_traversal_is_restartable() {
    let tree = FileTree::build(
        vec![
            MemoryFile::at_path("a/1", "1").into(),
            MemoryFile::at_path("b/2", "22").into(),
        ],
        true,
    )
    .await
    .unwrap();

    let first: Vec<NodeId> = tree.files().map(|(id, _, _)| id).collect();
    let second: Vec<NodeId> = tree.files().map(|(id, _, _)| id).collect();
    assert_eq!(first, second);

    let b = tree.children(tree.root())[1];
    let under: Vec<u64> = tree.files_under(b).map(|(_, file, _)| file.length).collect();
    assert_eq!(under, [2]);
    assert!(tree.source(first[0]).is_some());
}

#[tokio::test]
async fn test_file_tree_to_value() {
    let mut tree = FileTree::build(
        vec![
            MemoryFile::at_path("dir/a.sh", "#!")
                .with_attributes(FileAttributes {
                    executable: true,
                    ..Default::default()
                })
                .into(),
            MemoryFile::new("empty", Bytes::new()).into(),
        ],
        true,
    )
    .await
    .unwrap();

    let (script, _, _) = tree.files().next().unwrap();
    tree.set_pieces_root(script, [7u8; 32]);

    let value = tree.to_value(tree.root());
    let leaf = value
        .get(b"dir")
        .and_then(|dir| dir.get(b"a.sh"))
        .and_then(|file| file.get(b""))
        .unwrap();
    assert_eq!(leaf.get(b"length"), Some(&Value::Integer(2)));
    assert_eq!(leaf.get(b"attr").and_then(|v| v.as_str()), Some("x"));
    assert_eq!(
        leaf.get(b"pieces root").and_then(|v| v.as_bytes()).map(|b| b.to_vec()),
        Some(vec![7u8; 32])
    );

    let empty = value.get(b"empty").and_then(|file| file.get(b"")).unwrap();
    assert!(empty.get(b"pieces root").is_none());
    assert_eq!(
        encode(empty),
        b"d6:lengthi0ee".to_vec(),
    );
}

#[tokio::test]
async fn test_file_tree_extend_reuses_tree() {
    let mut tree = FileTree::new(true);
    tree.extend(vec![MemoryFile::new("a", "1").into()]).await.unwrap();
    tree.extend(vec![MemoryFile::new("b", "22").into()]).await.unwrap();
    assert_eq!(tree.file_count(), 2);
    assert_eq!(tree.total_size(), 3);
}

fn v1_single_file() -> Value {
    let mut info = Value::dict();
    info.insert("name", "test.txt");
    info.insert("piece length", 16384i64);
    info.insert("length", 1000i64);
    info.insert("pieces", vec![0u8; 20]);

    let mut root = Value::dict();
    root.insert("announce", "http://tracker.example.com/announce");
    root.insert("info", info);
    root
}

#[test]
fn test_metainfo_parse_v1_single_file() {
    let data = encode(&v1_single_file());
    let metainfo = Metainfo::from_bytes(&data).unwrap();

    assert_eq!(metainfo.version, TorrentVersion::V1);
    assert!(metainfo.info_hash.is_v1());
    assert_eq!(metainfo.info.name, "test.txt");
    assert_eq!(metainfo.info.total_length, 1000);
    assert_eq!(metainfo.info.piece_count(), 1);
    assert_eq!(metainfo.info.files[0].path.to_str(), Some("test.txt"));
    assert_eq!(metainfo.trackers(), ["http://tracker.example.com/announce"]);
    assert!(data.windows(metainfo.raw_info().len()).any(|w| w == &metainfo.raw_info()[..]));
}

#[test]
fn test_metainfo_parse_v1_multi_file() {
    let mut info = Value::dict();
    info.insert("name", "multi");
    info.insert("piece length", 16384i64);
    info.insert("pieces", vec![0u8; 40]);
    let file = |path: &[&str], length: i64| {
        let mut file = Value::dict();
        file.insert("length", length);
        file.insert(
            "path",
            path.iter().map(|s| Value::from(*s)).collect::<Vec<_>>(),
        );
        file
    };
    info.insert(
        "files",
        vec![file(&["a", "one.txt"], 100), file(&["two.txt"], 200)],
    );
    let mut root = Value::dict();
    root.insert("info", info);
    root.insert("url-list", "http://seed.example/multi");

    let metainfo = Metainfo::from_bytes(&encode(&root)).unwrap();
    let files = &metainfo.info.files;
    assert_eq!(files.len(), 2);
    assert_eq!(files[0].path, std::path::PathBuf::from("multi/a/one.txt"));
    assert_eq!(files[1].offset, 100);
    assert_eq!(metainfo.info.total_length, 300);
    assert_eq!(metainfo.url_list, ["http://seed.example/multi"]);
}

#[test]
fn test_metainfo_parse_v2_file_tree() {
    let leaf = |length: i64, root: u8| {
        let mut props = Value::dict();
        props.insert("length", length);
        props.insert("pieces root", vec![root; 32]);
        let mut leaf = Value::dict();
        leaf.insert("", props);
        leaf
    };
    let mut sub = Value::dict();
    sub.insert("b", leaf(20000, 2));
    let mut tree = Value::dict();
    tree.insert("a", leaf(10, 1));
    tree.insert("sub", sub);

    let mut info = Value::dict();
    info.insert("name", "v2");
    info.insert("piece length", 16384i64);
    info.insert("meta version", 2i64);
    info.insert("file tree", tree);

    let mut layers = Value::dict();
    layers.insert(Bytes::from(vec![2u8; 32]), vec![9u8; 64]);
    let mut root = Value::dict();
    root.insert("info", info);
    root.insert("piece layers", layers);

    let metainfo = Metainfo::from_bytes(&encode(&root)).unwrap();
    assert!(metainfo.is_v2());
    assert!(metainfo.info_hash.is_v2());
    let paths: Vec<String> = metainfo
        .info
        .files
        .iter()
        .map(|f| f.path.display().to_string())
        .collect();
    assert_eq!(paths, ["v2/a", "v2/sub/b"]);
    assert_eq!(metainfo.info.files[1].offset, 10);
    assert_eq!(metainfo.info.files[1].pieces_root, Some([2u8; 32]));
    assert_eq!(metainfo.piece_layers[&[2u8; 32]], vec![[9u8; 32]; 2]);
}

#[test]
fn test_metainfo_rejects_malformed() {
    let mut value = v1_single_file();
    value
        .as_dict_mut()
        .and_then(|root| root.get_mut(b"info".as_slice()))
        .unwrap()
        .insert("pieces", vec![0u8; 19]);
    assert!(matches!(
        Metainfo::from_bytes(&encode(&value)),
        Err(MetainfoError::InvalidField("pieces"))
    ));

    let mut info = Value::dict();
    info.insert("name", "x");
    info.insert("piece length", 16384i64);
    let mut root = Value::dict();
    root.insert("info", info);
    assert!(matches!(
        Metainfo::from_bytes(&encode(&root)),
        Err(MetainfoError::MissingField("pieces"))
    ));

    assert!(matches!(
        Metainfo::from_bytes(b"d4:infoi1ee"),
        Err(MetainfoError::InvalidField("info"))
    ));
    assert!(matches!(
        Metainfo::from_bytes(b"not bencode"),
        Err(MetainfoError::Bencode(_))
    ));
}

#[test]
fn test_metainfo_attributes_and_padding() {
    let mut info = Value::dict();
    info.insert("name", "padded");
    info.insert("piece length", 16384i64);
    info.insert("pieces", vec![0u8; 40]);
    let mut real = Value::dict();
    real.insert("length", 100i64);
    real.insert("path", vec![Value::from("run.sh")]);
    real.insert("attr", "x");
    let mut pad = Value::dict();
    pad.insert("length", 16284i64);
    pad.insert("path", vec![Value::from(".pad"), Value::from("16284")]);
    pad.insert("attr", "p");
    info.insert("files", vec![real, pad]);
    let mut root = Value::dict();
    root.insert("info", info);

    let metainfo = Metainfo::from_bytes(&encode(&root)).unwrap();
    assert!(metainfo.info.files[0].attributes.executable);
    assert!(!metainfo.info.files[0].is_padding());
    assert!(metainfo.info.files[1].is_padding());
    assert_eq!(metainfo.info.total_length, 16384);
}
