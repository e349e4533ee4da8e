use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::path::{self, ValidationFlags};
use crate::{
    Clock, ErrorCode, FileSet, FileSystem, FileSystemOptions, FileSystemResolver, HostResolver,
    Link, MountStats, Result, ScanAxis, Symlink, Traversal, VfsResolver, S_IFDIR, S_IFREG,
};

const TIME: i64 = 1_000_000;

/// A fresh case-sensitive file system rooted at `/` with a frozen clock.
fn sample_fs() -> Arc<FileSystem> {
    FileSystem::with_options(
        false,
        FileSystemOptions {
            time: Some(Clock::fixed(TIME)),
            cwd: Some(String::from("/")),
            ..Default::default()
        },
    )
    .expect("failed to create file system")
}

fn paths(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

// === path algebra ===

#[test]
fn parse_collapses_dots_and_formats_back() {
    assert_eq!(path::parse("/a//b/./c/../d"), paths(&["/", "a", "b", "d"]));
    assert_eq!(path::format(&path::parse("/a//b/./c/../d")), "/a/b/d");
    assert_eq!(path::parse("/"), paths(&["/"]));
}

#[test]
fn dotdot_is_clamped_at_an_absolute_root() {
    assert_eq!(path::resolve("/", "../.."), "/");
    assert_eq!(path::resolve("/a/b", "../../../.."), "/");
    assert_eq!(path::resolve("c:/a", ".."), "c:/");
}

#[test]
fn relative_paths_keep_leading_dotdot() {
    assert_eq!(path::parse("a/../../b"), paths(&["", "..", "b"]));
    assert_eq!(path::format(&path::parse("a/../../b")), "../b");
}

#[test]
fn dirname_and_basename() {
    assert_eq!(path::dirname("/a/b"), "/a");
    assert_eq!(path::dirname("/a"), "/");
    assert_eq!(path::dirname("/"), "/");
    assert_eq!(path::basename("/a/b.txt"), "b.txt");
    assert_eq!(path::basename("/"), "");
}

#[test]
fn validate_checks_the_requested_shape() {
    assert!(path::validate("/a", ValidationFlags::ABSOLUTE).is_ok());
    assert_eq!(
        path::validate("/a", ValidationFlags::RELATIVE).unwrap_err().code,
        ErrorCode::EINVAL
    );
    assert_eq!(
        path::validate("", ValidationFlags::RELATIVE_OR_ABSOLUTE)
            .unwrap_err()
            .code,
        ErrorCode::EINVAL
    );
    // separators are normalized, nothing else
    assert_eq!(path::validate("a\\b", ValidationFlags::RELATIVE).unwrap(), "a/b");
}

// === basic operations ===

#[test]
fn write_stat_read_roundtrip() -> Result<()> {
    let fs = sample_fs();
    fs.mkdir("/a")?;
    fs.write_file("/a/b.txt", "hi")?;
    assert_eq!(fs.stat("/a/b.txt")?.size, 2);
    assert_eq!(fs.read_file_to_string("/a/b.txt")?, "hi");
    assert_eq!(fs.readdir("/a")?, ["b.txt"]);
    Ok(())
}

#[test]
fn read_file_returns_a_detached_copy() -> Result<()> {
    let fs = sample_fs();
    fs.write_file("/f", b"abc".to_vec())?;
    let mut copy = fs.read_file("/f")?;
    copy[0] = b'x';
    assert_eq!(fs.read_file("/f")?, b"abc");
    Ok(())
}

#[test]
fn mkdir_errors() -> Result<()> {
    let fs = sample_fs();
    fs.mkdir("/a")?;
    assert_eq!(fs.mkdir("/a").unwrap_err().code, ErrorCode::EEXIST);
    assert_eq!(fs.mkdir("/no/such/dir").unwrap_err().code, ErrorCode::ENOENT);
    Ok(())
}

#[test]
fn mkdirp_creates_missing_ancestors() -> Result<()> {
    let fs = sample_fs();
    fs.mkdirp("/a/b/c")?;
    assert!(fs.directory_exists("/a/b/c"));
    // already existing is fine
    fs.mkdirp("/a/b")?;
    Ok(())
}

#[test]
fn mode_bits_are_masked_at_creation() -> Result<()> {
    let fs = sample_fs();
    fs.mkdir("/d")?;
    fs.write_file("/d/f", "")?;
    assert_eq!(fs.stat("/d")?.mode, S_IFDIR | 0o755);
    assert_eq!(fs.stat("/d/f")?.mode, S_IFREG | 0o644);
    Ok(())
}

#[test]
fn rename_across_directories_keeps_the_inode() -> Result<()> {
    let fs = sample_fs();
    fs.mkdir("/a")?;
    fs.write_file("/a/b.txt", "hi")?;
    let ino = fs.stat("/a/b.txt")?.ino;
    fs.mkdir("/c")?;
    fs.rename("/a/b.txt", "/c/b.txt")?;
    assert_eq!(fs.readdir("/a")?, Vec::<String>::new());
    assert_eq!(fs.read_file_to_string("/c/b.txt")?, "hi");
    assert_eq!(fs.stat("/c/b.txt")?.ino, ino);
    Ok(())
}

#[test]
fn rename_replaces_and_refuses_correctly() -> Result<()> {
    let fs = sample_fs();
    fs.mkdir("/a")?;
    fs.mkdir("/b")?;
    fs.write_file("/b/inner", "")?;
    fs.write_file("/f", "new")?;
    fs.write_file("/g", "old")?;
    // file over file replaces
    fs.rename("/f", "/g")?;
    assert_eq!(fs.read_file_to_string("/g")?, "new");
    // file over directory
    fs.write_file("/h", "")?;
    assert_eq!(fs.rename("/h", "/a").unwrap_err().code, ErrorCode::EISDIR);
    // directory over non-empty directory
    fs.mkdir("/e")?;
    assert_eq!(fs.rename("/e", "/b").unwrap_err().code, ErrorCode::ENOTEMPTY);
    // directory over file
    assert_eq!(fs.rename("/e", "/h").unwrap_err().code, ErrorCode::ENOTDIR);
    // missing source, root targets
    assert_eq!(fs.rename("/nope", "/x").unwrap_err().code, ErrorCode::ENOENT);
    assert_eq!(fs.rename("/", "/x").unwrap_err().code, ErrorCode::EPERM);
    // renaming onto itself is a no-op
    fs.rename("/g", "/g")?;
    assert_eq!(fs.stat("/g")?.nlink, 1);
    Ok(())
}

#[test]
fn link_counting_matches_directory_entries() -> Result<()> {
    let fs = sample_fs();
    fs.write_file("/f", "x")?;
    assert_eq!(fs.stat("/f")?.nlink, 1);
    fs.link("/f", "/g")?;
    assert_eq!(fs.stat("/f")?.nlink, 2);
    assert_eq!(fs.stat("/g")?.ino, fs.stat("/f")?.ino);
    // content is shared through either name
    fs.write_file("/g", "y")?;
    assert_eq!(fs.read_file_to_string("/f")?, "y");
    fs.unlink("/f")?;
    assert_eq!(fs.stat("/g")?.nlink, 1);
    Ok(())
}

#[test]
fn link_refuses_directories_and_taken_names() -> Result<()> {
    let fs = sample_fs();
    fs.mkdir("/d")?;
    fs.write_file("/f", "")?;
    assert_eq!(fs.link("/d", "/e").unwrap_err().code, ErrorCode::EPERM);
    assert_eq!(fs.link("/f", "/d").unwrap_err().code, ErrorCode::EEXIST);
    assert_eq!(fs.link("/nope", "/x").unwrap_err().code, ErrorCode::ENOENT);
    Ok(())
}

#[test]
fn unlink_errors() -> Result<()> {
    let fs = sample_fs();
    fs.mkdir("/d")?;
    assert_eq!(fs.unlink("/d").unwrap_err().code, ErrorCode::EISDIR);
    assert_eq!(fs.unlink("/nope").unwrap_err().code, ErrorCode::ENOENT);
    assert_eq!(fs.unlink("/").unwrap_err().code, ErrorCode::EPERM);
    Ok(())
}

#[test]
fn rmdir_errors() -> Result<()> {
    let fs = sample_fs();
    fs.mkdir("/d")?;
    fs.write_file("/d/f", "")?;
    assert_eq!(fs.rmdir("/d").unwrap_err().code, ErrorCode::ENOTEMPTY);
    assert_eq!(fs.rmdir("/d/f").unwrap_err().code, ErrorCode::ENOTDIR);
    assert_eq!(fs.rmdir("/").unwrap_err().code, ErrorCode::EPERM);
    fs.unlink("/d/f")?;
    fs.rmdir("/d")?;
    assert!(!fs.exists("/d"));
    Ok(())
}

#[test]
fn readdir_is_sorted_and_repeatable() -> Result<()> {
    let fs = sample_fs();
    for name in &["zeta", "alpha", "mid"] {
        fs.mkdir(&format!("/{}", name))?;
    }
    fs.write_file("/beta.txt", "")?;
    let first = fs.readdir("/")?;
    assert_eq!(first, ["alpha", "beta.txt", "mid", "zeta"]);
    assert_eq!(fs.readdir("/")?, first);
    assert_eq!(fs.readdir("/beta.txt").unwrap_err().code, ErrorCode::ENOTDIR);
    Ok(())
}

#[test]
fn case_insensitive_names_share_an_entry() -> Result<()> {
    let fs = FileSystem::with_options(
        true,
        FileSystemOptions {
            cwd: Some(String::from("/")),
            ..Default::default()
        },
    )?;
    fs.write_file("/Readme.MD", "one")?;
    assert_eq!(fs.read_file_to_string("/readme.md")?, "one");
    fs.write_file("/README.md", "two")?;
    // still one entry, listed under its first spelling
    assert_eq!(fs.readdir("/")?, ["Readme.MD"]);
    assert_eq!(fs.read_file_to_string("/readme.md")?, "two");
    Ok(())
}

#[test]
fn first_root_becomes_the_cwd() -> Result<()> {
    let fs = FileSystem::new(false);
    assert_eq!(fs.cwd(), "");
    fs.mkdir("/")?;
    assert_eq!(fs.cwd(), "/");
    Ok(())
}

#[test]
fn secondary_roots_coexist() -> Result<()> {
    let fs = sample_fs();
    fs.mkdir("c:/")?;
    fs.write_file("c:/x.txt", "dos")?;
    assert_eq!(fs.read_file_to_string("c:/x.txt")?, "dos");
    assert_eq!(fs.cwd(), "/");
    // the two roots live on different devices
    assert_ne!(fs.stat("/")?.dev, fs.stat("c:/")?.dev);
    Ok(())
}

#[test]
fn chdir_resolves_relative_paths() -> Result<()> {
    let fs = sample_fs();
    fs.mkdirp("/a/b")?;
    fs.chdir("/a")?;
    assert_eq!(fs.cwd(), "/a");
    fs.write_file("b/f.txt", "rel")?;
    assert_eq!(fs.read_file_to_string("/a/b/f.txt")?, "rel");
    assert_eq!(fs.chdir("/nope").unwrap_err().code, ErrorCode::ENOENT);
    assert_eq!(fs.chdir("b/f.txt").unwrap_err().code, ErrorCode::ENOTDIR);
    Ok(())
}

#[test]
fn pushd_and_popd_drive_the_directory_stack() -> Result<()> {
    let fs = sample_fs();
    fs.mkdirp("/a/b")?;
    fs.pushd(Some("/a"))?;
    fs.pushd(Some("b"))?;
    assert_eq!(fs.cwd(), "/a/b");
    fs.popd()?;
    assert_eq!(fs.cwd(), "/a");
    fs.popd()?;
    assert_eq!(fs.cwd(), "/");
    // empty stack: no-op
    fs.popd()?;
    assert_eq!(fs.cwd(), "/");
    Ok(())
}

// === symlinks ===

#[test]
fn symlink_follow_and_no_follow() -> Result<()> {
    let fs = sample_fs();
    fs.mkdir("/c")?;
    fs.write_file("/c/b.txt", "hi")?;
    fs.symlink("/c/b.txt", "/link")?;
    assert!(fs.stat("/link")?.is_file());
    assert!(fs.lstat("/link")?.is_symbolic_link());
    assert_eq!(fs.realpath("/link")?, "/c/b.txt");
    Ok(())
}

#[test]
fn readlink_returns_the_stored_text_verbatim() -> Result<()> {
    let fs = sample_fs();
    fs.symlink("x/../y", "/l")?;
    assert_eq!(fs.readlink("/l")?, "x/../y");
    fs.write_file("/f", "")?;
    assert_eq!(fs.readlink("/f").unwrap_err().code, ErrorCode::EINVAL);
    Ok(())
}

#[test]
fn symlink_loops_are_detected() -> Result<()> {
    let fs = sample_fs();
    fs.symlink("/x", "/y")?;
    fs.symlink("/y", "/x")?;
    assert_eq!(fs.stat("/x").unwrap_err().code, ErrorCode::ELOOP);
    Ok(())
}

#[test]
fn symlink_chains_resolve_up_to_the_depth_limit() -> Result<()> {
    let fs = sample_fs();
    fs.write_file("/f", "deep")?;
    fs.symlink("/f", "/s1")?;
    for i in 2..=40 {
        fs.symlink(&format!("/s{}", i - 1), &format!("/s{}", i))?;
    }
    assert_eq!(fs.read_file_to_string("/s39")?, "deep");
    assert_eq!(fs.stat("/s40").unwrap_err().code, ErrorCode::ELOOP);
    Ok(())
}

#[test]
fn realpath_is_a_fixed_point() -> Result<()> {
    let fs = sample_fs();
    fs.mkdirp("/a/b")?;
    fs.symlink("/a", "/la")?;
    fs.symlink("/la/b", "/lb")?;
    let real = fs.realpath("/lb")?;
    assert_eq!(real, "/a/b");
    assert_eq!(fs.realpath(&real)?, real);
    Ok(())
}

#[test]
fn writing_through_a_dangling_symlink_creates_the_target() -> Result<()> {
    let fs = sample_fs();
    fs.mkdir("/t")?;
    fs.symlink("/t/f", "/l")?;
    fs.write_file("/l", "made")?;
    assert_eq!(fs.read_file_to_string("/t/f")?, "made");
    Ok(())
}

#[test]
fn symlink_size_is_the_target_length() -> Result<()> {
    let fs = sample_fs();
    fs.symlink("/abc", "/l")?;
    assert_eq!(fs.lstat("/l")?.size, 4);
    Ok(())
}

// === clock ===

#[test]
fn fixed_clock_stamps_deterministic_times() -> Result<()> {
    let fs = sample_fs();
    fs.write_file("/f", "one")?;
    let stats = fs.stat("/f")?;
    assert_eq!(stats.mtime_ms, TIME);
    assert_eq!(stats.birthtime_ms, TIME);
    fs.set_time(TIME + 5)?;
    fs.write_file("/f", "two")?;
    let stats = fs.stat("/f")?;
    assert_eq!(stats.mtime_ms, TIME + 5);
    assert_eq!(stats.ctime_ms, TIME + 5);
    assert_eq!(stats.birthtime_ms, TIME);
    Ok(())
}

#[test]
fn callback_clock_is_consulted_per_operation() -> Result<()> {
    let ticks = Arc::new(AtomicUsize::new(0));
    let source = ticks.clone();
    let fs = FileSystem::with_options(
        false,
        FileSystemOptions {
            time: Some(Clock::from_fn(move || {
                source.fetch_add(1, Ordering::SeqCst) as i64
            })),
            cwd: Some(String::from("/")),
            ..Default::default()
        },
    )?;
    fs.write_file("/a", "")?;
    fs.write_file("/b", "")?;
    assert!(fs.stat("/b")?.birthtime_ms > fs.stat("/a")?.birthtime_ms);
    Ok(())
}

// === read-only and shadow ===

#[test]
fn readonly_rejects_every_mutation() -> Result<()> {
    let fs = sample_fs();
    fs.mkdir("/a")?;
    fs.write_file("/a/f", "keep")?;
    let listing = fs.readdir("/a")?;
    fs.make_readonly();
    assert!(fs.is_readonly());

    let code = |r: Result<()>| r.unwrap_err().code;
    assert_eq!(code(fs.mkdir("/b")), ErrorCode::EROFS);
    assert_eq!(code(fs.mkdirp("/b/c")), ErrorCode::EROFS);
    assert_eq!(code(fs.rmdir("/a")), ErrorCode::EROFS);
    assert_eq!(code(fs.unlink("/a/f")), ErrorCode::EROFS);
    assert_eq!(code(fs.link("/a/f", "/g")), ErrorCode::EROFS);
    assert_eq!(code(fs.rename("/a/f", "/g")), ErrorCode::EROFS);
    assert_eq!(code(fs.symlink("/a", "/l")), ErrorCode::EROFS);
    assert_eq!(code(fs.write_file("/a/f", "no")), ErrorCode::EROFS);
    assert_eq!(code(fs.rimraf("/a")), ErrorCode::EROFS);
    assert_eq!(code(fs.chdir("/a")), ErrorCode::EROFS);
    assert_eq!(code(fs.pushd(Some("/a"))), ErrorCode::EROFS);
    assert_eq!(code(fs.popd()), ErrorCode::EROFS);
    assert_eq!(code(fs.apply(&FileSet::new())), ErrorCode::EROFS);
    assert_eq!(fs.filemeta("/a/f").unwrap_err().code, ErrorCode::EROFS);
    assert_eq!(fs.set_time(1).unwrap_err().code, ErrorCode::EPERM);

    // nothing observable changed
    assert_eq!(fs.readdir("/a")?, listing);
    assert_eq!(fs.read_file_to_string("/a/f")?, "keep");
    Ok(())
}

#[test]
fn shadow_isolates_writes_from_the_parent() -> Result<()> {
    let parent = sample_fs();
    parent.mkdir("/a")?;
    parent.write_file("/a/b.txt", "hi")?;
    parent.make_readonly();

    let child = parent.shadow()?;
    child.write_file("/a/b.txt", "bye")?;
    assert_eq!(child.read_file_to_string("/a/b.txt")?, "bye");
    assert_eq!(parent.read_file_to_string("/a/b.txt")?, "hi");

    child.write_file("/a/new.txt", "only here")?;
    assert!(!parent.exists("/a/new.txt"));

    child.unlink("/a/b.txt")?;
    assert_eq!(parent.read_file_to_string("/a/b.txt")?, "hi");
    Ok(())
}

#[test]
fn shadow_reads_fall_through_to_the_parent() -> Result<()> {
    let parent = sample_fs();
    parent.mkdirp("/deep/down")?;
    parent.write_file("/deep/down/f.bin", b"\x00\x01\x02".to_vec())?;
    parent.symlink("/deep/down", "/short")?;
    parent.make_readonly();

    let child = parent.shadow()?;
    assert_eq!(child.read_file("/deep/down/f.bin")?, b"\x00\x01\x02");
    assert_eq!(child.readdir("/deep")?, ["down"]);
    assert_eq!(child.readlink("/short")?, "/deep/down");
    // shadow inodes keep the identity of their source
    assert_eq!(child.stat("/deep/down/f.bin")?.ino, parent.stat("/deep/down/f.bin")?.ino);
    assert_eq!(child.stat("/deep/down/f.bin")?.dev, parent.stat("/deep/down/f.bin")?.dev);
    Ok(())
}

#[test]
fn shadow_preconditions() -> Result<()> {
    let fs = sample_fs();
    assert_eq!(fs.shadow().unwrap_err().code, ErrorCode::EPERM);
    fs.make_readonly();
    assert_eq!(fs.shadow_with(true).unwrap_err().code, ErrorCode::EINVAL);

    let loose = FileSystem::with_options(
        true,
        FileSystemOptions {
            cwd: Some(String::from("/")),
            ..Default::default()
        },
    )?;
    loose.make_readonly();
    // a case-sensitive shadow of a case-insensitive parent is allowed
    assert!(loose.shadow_with(false).is_ok());
    Ok(())
}

#[test]
fn shadow_chains_compose() -> Result<()> {
    let base = sample_fs();
    base.write_file("/f", "base")?;
    base.make_readonly();
    let middle = base.shadow()?;
    middle.write_file("/g", "middle")?;
    middle.make_readonly();
    let top = middle.shadow()?;
    assert_eq!(top.read_file_to_string("/f")?, "base");
    assert_eq!(top.read_file_to_string("/g")?, "middle");
    top.write_file("/f", "top")?;
    assert_eq!(middle.read_file_to_string("/f")?, "base");
    Ok(())
}

#[test]
fn filemeta_inherits_through_the_shadow() -> Result<()> {
    let parent = sample_fs();
    parent.write_file("/f", "")?;
    let parent_meta = parent.filemeta("/f")?;
    parent_meta.set("origin", "parent");
    parent.make_readonly();

    let child = parent.shadow()?;
    let child_meta = child.filemeta("/f")?;
    assert_eq!(child_meta.get("origin"), Some("parent".into()));
    child_meta.set("origin", "child");
    assert_eq!(child_meta.get("origin"), Some("child".into()));
    assert_eq!(parent_meta.get("origin"), Some("parent".into()));
    // deleting the override uncovers the inherited value
    child_meta.delete("origin");
    assert_eq!(child_meta.get("origin"), Some("parent".into()));
    Ok(())
}

// === mounts ===

struct CountingResolver {
    reads: AtomicUsize,
}

impl CountingResolver {
    fn new() -> Arc<Self> {
        Arc::new(CountingResolver {
            reads: AtomicUsize::new(0),
        })
    }
}

impl FileSystemResolver for CountingResolver {
    fn stat(&self, path: &str) -> Result<MountStats> {
        match path {
            "/src" => Ok(MountStats {
                mode: S_IFDIR | 0o777,
                size: 0,
            }),
            "/src/f" => Ok(MountStats {
                mode: S_IFREG | 0o666,
                size: 3,
            }),
            _ => Err(ErrorCode::ENOENT.into()),
        }
    }

    fn read_dir(&self, path: &str) -> Result<Vec<String>> {
        match path {
            "/src" => Ok(vec![String::from("f")]),
            _ => Err(ErrorCode::ENOENT.into()),
        }
    }

    fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        match path {
            "/src/f" => Ok(b"abc".to_vec()),
            _ => Err(ErrorCode::ENOENT.into()),
        }
    }
}

#[test]
fn mounted_files_load_lazily_and_once() -> Result<()> {
    let fs = sample_fs();
    let resolver = CountingResolver::new();
    fs.mount("/src", "/m", resolver.clone())?;
    assert_eq!(resolver.reads.load(Ordering::SeqCst), 0);

    // stat sees the resolver-reported size without loading content
    assert_eq!(fs.stat("/m/f")?.size, 3);
    assert_eq!(resolver.reads.load(Ordering::SeqCst), 0);

    assert_eq!(fs.read_file_to_string("/m/f")?, "abc");
    assert_eq!(resolver.reads.load(Ordering::SeqCst), 1);
    assert_eq!(fs.read_file_to_string("/m/f")?, "abc");
    assert_eq!(resolver.reads.load(Ordering::SeqCst), 1);
    Ok(())
}

#[test]
fn mount_target_must_be_free() -> Result<()> {
    let fs = sample_fs();
    fs.mkdir("/m")?;
    let err = fs.mount("/src", "/m", CountingResolver::new()).unwrap_err();
    assert_eq!(err.code, ErrorCode::EEXIST);
    Ok(())
}

#[test]
fn mounted_directories_expand_one_level_at_a_time() -> Result<()> {
    struct TreeResolver;
    impl FileSystemResolver for TreeResolver {
        fn stat(&self, path: &str) -> Result<MountStats> {
            let (mode, size) = match path {
                "/src" | "/src/d" => (S_IFDIR | 0o777, 0),
                "/src/a.txt" => (S_IFREG | 0o666, 1),
                "/src/d/b.txt" => (S_IFREG | 0o666, 2),
                _ => return Err(ErrorCode::ENOENT.into()),
            };
            Ok(MountStats { mode, size })
        }

        fn read_dir(&self, path: &str) -> Result<Vec<String>> {
            match path {
                "/src" => Ok(vec![String::from("d"), String::from("a.txt")]),
                "/src/d" => Ok(vec![String::from("b.txt")]),
                _ => Err(ErrorCode::ENOENT.into()),
            }
        }

        fn read_file(&self, path: &str) -> Result<Vec<u8>> {
            match path {
                "/src/a.txt" => Ok(b"a".to_vec()),
                "/src/d/b.txt" => Ok(b"bb".to_vec()),
                _ => Err(ErrorCode::ENOENT.into()),
            }
        }
    }

    let fs = sample_fs();
    fs.mount("/src", "/m", Arc::new(TreeResolver))?;
    assert_eq!(fs.readdir("/m")?, ["a.txt", "d"]);
    assert_eq!(fs.read_file_to_string("/m/d/b.txt")?, "bb");
    assert_eq!(fs.stat("/m/a.txt")?.size, 1);
    Ok(())
}

#[test]
fn host_resolver_reads_a_real_directory() -> Result<()> {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    std::fs::create_dir(dir.path().join("sub")).unwrap();
    std::fs::write(dir.path().join("sub/hello.txt"), b"hello").unwrap();

    let fs = sample_fs();
    fs.mount("/", "/host", Arc::new(HostResolver::new(dir.path())))?;
    assert_eq!(fs.readdir("/host")?, ["sub"]);
    assert_eq!(fs.read_file_to_string("/host/sub/hello.txt")?, "hello");
    assert_eq!(fs.stat("/host/sub/hello.txt")?.size, 5);
    Ok(())
}

#[test]
fn vfs_resolver_mounts_one_instance_in_another() -> Result<()> {
    let inner = sample_fs();
    inner.mkdir("/data")?;
    inner.write_file("/data/f.txt", "42")?;

    let outer = sample_fs();
    outer.mount("/data", "/m", Arc::new(VfsResolver(inner)))?;
    assert_eq!(outer.readdir("/m")?, ["f.txt"]);
    assert_eq!(outer.read_file_to_string("/m/f.txt")?, "42");
    Ok(())
}

// === scanner ===

fn scan_sample() -> Result<Arc<FileSystem>> {
    let fs = sample_fs();
    fs.mkdirp("/a/c")?;
    fs.write_file("/a/b.txt", "")?;
    fs.write_file("/a/c/d.txt", "")?;
    fs.write_file("/z.txt", "")?;
    Ok(fs)
}

#[test]
fn scan_descendants_in_name_order() -> Result<()> {
    let fs = scan_sample()?;
    let all = fs.scan("/", ScanAxis::DescendantsOrSelf, &Traversal::new())?;
    assert_eq!(
        all,
        paths(&["/", "/a", "/a/b.txt", "/a/c", "/a/c/d.txt", "/z.txt"])
    );
    Ok(())
}

#[test]
fn scan_accept_filters_results() -> Result<()> {
    let fs = scan_sample()?;
    let traversal = Traversal::new().accept(|p, _| p.ends_with(".txt"));
    let found = fs.scan("/", ScanAxis::Descendants, &traversal)?;
    assert_eq!(found, paths(&["/a/b.txt", "/a/c/d.txt", "/z.txt"]));
    Ok(())
}

#[test]
fn scan_traverse_gates_descent() -> Result<()> {
    let fs = scan_sample()?;
    let traversal = Traversal::new().traverse(|p, _| p != "/a");
    let found = fs.scan("/", ScanAxis::DescendantsOrSelf, &traversal)?;
    assert_eq!(found, paths(&["/", "/a", "/z.txt"]));
    Ok(())
}

#[test]
fn scan_ancestors_stops_at_the_root() -> Result<()> {
    let fs = sample_fs();
    fs.mkdirp("/a/b/c")?;
    let up = fs.scan("/a/b/c", ScanAxis::AncestorsOrSelf, &Traversal::new())?;
    assert_eq!(up, paths(&["/a/b/c", "/a/b", "/a", "/"]));
    let strictly_up = fs.scan("/a/b/c", ScanAxis::Ancestors, &Traversal::new())?;
    assert_eq!(strictly_up, paths(&["/a/b", "/a", "/"]));
    Ok(())
}

#[test]
fn scan_surfaces_only_the_top_level_error() -> Result<()> {
    let fs = scan_sample()?;
    let err = fs
        .scan("/missing", ScanAxis::DescendantsOrSelf, &Traversal::new())
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::ENOENT);
    Ok(())
}

#[test]
fn lscan_does_not_traverse_through_symlinks() -> Result<()> {
    let fs = scan_sample()?;
    fs.symlink("/a", "/la")?;
    let found = fs.lscan("/", ScanAxis::DescendantsOrSelf, &Traversal::new())?;
    // `/la` shows up as itself, its children do not
    assert_eq!(
        found,
        paths(&["/", "/a", "/a/b.txt", "/a/c", "/a/c/d.txt", "/la", "/z.txt"])
    );
    let followed = fs.scan("/", ScanAxis::DescendantsOrSelf, &Traversal::new())?;
    assert!(followed.contains(&String::from("/la/b.txt")));
    Ok(())
}

// === rimraf ===

#[test]
fn rimraf_on_a_missing_path_is_fine() -> Result<()> {
    let fs = sample_fs();
    fs.rimraf("/does/not/exist")?;
    Ok(())
}

#[test]
fn rimraf_removes_recursively() -> Result<()> {
    let fs = sample_fs();
    fs.mkdirp("/a/b/c")?;
    fs.write_file("/a/b/f.txt", "")?;
    fs.symlink("/a/b", "/a/l")?;
    fs.rimraf("/a")?;
    assert!(!fs.exists("/a"));
    Ok(())
}

// === declarative apply ===

#[test]
fn apply_builds_a_nested_tree() -> Result<()> {
    let fs = sample_fs();
    fs.apply(
        &FileSet::new()
            .with(
                "/src",
                FileSet::new()
                    .with("main.rs", "fn main() {}")
                    .with("lib", FileSet::new().with("mod.rs", "")),
            )
            .with("/readme.md", crate::File::text("docs").meta("tag", "kept")),
    )?;
    assert_eq!(fs.read_file_to_string("/src/main.rs")?, "fn main() {}");
    assert!(fs.directory_exists("/src/lib"));
    assert_eq!(fs.filemeta("/readme.md")?.get("tag"), Some("kept".into()));
    Ok(())
}

#[test]
fn apply_defers_links_until_content_exists() -> Result<()> {
    let fs = sample_fs();
    // the hard link and symlink both appear before their targets
    fs.apply(
        &FileSet::new()
            .with("/hard.txt", Link::new("/data/f.txt"))
            .with("/soft.txt", Symlink::new("/data/f.txt"))
            .with("/data", FileSet::new().with("f.txt", "x")),
    )?;
    assert_eq!(fs.read_file_to_string("/hard.txt")?, "x");
    assert_eq!(fs.stat("/data/f.txt")?.nlink, 2);
    assert_eq!(fs.readlink("/soft.txt")?, "/data/f.txt");
    Ok(())
}

#[test]
fn apply_mounts_through_the_literal() -> Result<()> {
    let fs = sample_fs();
    let resolver = CountingResolver::new();
    fs.apply(&FileSet::new().with("/m", crate::Mount::new("/src", resolver.clone())))?;
    assert_eq!(resolver.reads.load(Ordering::SeqCst), 0);
    assert_eq!(fs.read_file_to_string("/m/f")?, "abc");
    Ok(())
}

#[test]
fn apply_removes_with_rimraf_semantics() -> Result<()> {
    let fs = sample_fs();
    fs.mkdirp("/old/deep")?;
    fs.apply(
        &FileSet::new()
            .with("/old", crate::Entry::Rimraf)
            .with("/gone/already", crate::Entry::Rimraf),
    )?;
    assert!(!fs.exists("/old"));
    Ok(())
}

#[test]
fn apply_resolves_relative_fragments_against_the_cwd() -> Result<()> {
    let fs = sample_fs();
    fs.mkdir("/work")?;
    fs.chdir("/work")?;
    fs.apply(&FileSet::new().with("out.txt", "rel"))?;
    assert_eq!(fs.read_file_to_string("/work/out.txt")?, "rel");
    Ok(())
}

#[test]
#[should_panic(expected = "Roots cannot be files.")]
fn apply_rejects_a_file_root() {
    let fs = sample_fs();
    let _ = fs.apply(&FileSet::new().with("/", "boom"));
}

#[test]
#[should_panic(expected = "Roots cannot be symbolic links.")]
fn apply_rejects_a_symlink_root() {
    let fs = sample_fs();
    let _ = fs.apply(&FileSet::new().with("/", Symlink::new("/elsewhere")));
}

#[test]
fn constructor_options_populate_the_tree() -> Result<()> {
    let fs = FileSystem::with_options(
        false,
        FileSystemOptions {
            time: Some(Clock::fixed(TIME)),
            cwd: Some(String::from("/home")),
            files: Some(FileSet::new().with("notes.txt", "hello")),
            meta: vec![(String::from("universe"), 42i64.into())],
        },
    )?;
    assert_eq!(fs.cwd(), "/home");
    assert_eq!(fs.read_file_to_string("/home/notes.txt")?, "hello");
    assert_eq!(fs.meta().get("universe"), Some(42i64.into()));
    Ok(())
}
