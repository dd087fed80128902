//! Builds a bare repository on disk: one pack with stored and delta
//! entries plus its v2 index, a loose object, and reference files.
//!
//! Identifiers are synthetic (no hashing involved); the reader never
//! recomputes them, so any distinct 20-byte values work.

use std::fs;
use std::io::Write;
use std::path::Path;

use flate2::write::ZlibEncoder;
use flate2::Compression;
use tempfile::TempDir;

use baregit::ObjectId;

const FANOUT_SIZE: usize = 256 * 4;

/// Builds pack files entry by entry, tracking offsets.
pub struct PackBuilder {
    bytes: Vec<u8>,
}

impl PackBuilder {
    pub fn new() -> Self {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"PACK");
        bytes.extend_from_slice(&2_u32.to_be_bytes());
        bytes.extend_from_slice(&0_u32.to_be_bytes());
        Self { bytes }
    }

    fn entry_header(&mut self, obj_type: u8, size: u64) {
        let mut size = size;
        let mut byte = (obj_type << 4) | (size & 0x0f) as u8;
        size >>= 4;
        while size > 0 {
            self.bytes.push(byte | 0x80);
            byte = (size & 0x7f) as u8;
            size >>= 7;
        }
        self.bytes.push(byte);
    }

    fn deflate(&mut self, data: &[u8]) {
        let mut enc = ZlibEncoder::new(Vec::new(), Compression::default());
        enc.write_all(data).unwrap();
        self.bytes.extend_from_slice(&enc.finish().unwrap());
    }

    /// Appends a stored object; returns its offset.
    pub fn add_stored(&mut self, obj_type: u8, payload: &[u8]) -> u64 {
        let offset = self.bytes.len() as u64;
        self.entry_header(obj_type, payload.len() as u64);
        self.deflate(payload);
        offset
    }

    /// Appends an offset-delta entry against `base_offset`; returns its
    /// offset.
    pub fn add_ofs_delta(&mut self, base_offset: u64, program: &[u8]) -> u64 {
        let offset = self.bytes.len() as u64;
        self.entry_header(6, program.len() as u64);
        self.bytes
            .extend_from_slice(&encode_ofs_distance(offset - base_offset));
        self.deflate(program);
        offset
    }

    pub fn build(mut self) -> Vec<u8> {
        self.bytes.extend_from_slice(&[0u8; 20]);
        self.bytes
    }
}

fn encode_ofs_distance(mut value: u64) -> Vec<u8> {
    let mut out = vec![(value & 0x7f) as u8];
    value >>= 7;
    while value > 0 {
        value -= 1;
        out.push(0x80 | (value & 0x7f) as u8);
        value >>= 7;
    }
    out.reverse();
    out
}

/// Builds a v2 pack index for a list of (id, offset) pairs.
pub fn build_idx(objects: &[(ObjectId, u64)]) -> Vec<u8> {
    let mut objects: Vec<_> = objects.to_vec();
    objects.sort_by(|a, b| a.0.cmp(&b.0));

    let mut fanout = vec![0u8; FANOUT_SIZE];
    let mut counts = [0u32; 256];
    for (id, _) in &objects {
        counts[id.first_byte() as usize] += 1;
    }
    let mut running = 0u32;
    for (i, count) in counts.iter().enumerate() {
        running += count;
        fanout[i * 4..i * 4 + 4].copy_from_slice(&running.to_be_bytes());
    }

    let mut out = Vec::new();
    out.extend_from_slice(&[0xff, b't', b'O', b'c']);
    out.extend_from_slice(&2_u32.to_be_bytes());
    out.extend_from_slice(&fanout);
    for (id, _) in &objects {
        out.extend_from_slice(id.as_bytes());
    }
    out.extend_from_slice(&vec![0u8; objects.len() * 4]); // CRCs
    for (_, offset) in &objects {
        out.extend_from_slice(&(*offset as u32).to_be_bytes());
    }
    out.extend_from_slice(&[0u8; 40]);
    out
}

/// Encodes one tree entry: `<mode> SP <name> NUL <id>`.
pub fn tree_entry(mode: &str, name: &[u8], id: &ObjectId) -> Vec<u8> {
    let mut out = mode.as_bytes().to_vec();
    out.push(b' ');
    out.extend_from_slice(name);
    out.push(0);
    out.extend_from_slice(id.as_bytes());
    out
}

fn size_header(mut value: u64) -> Vec<u8> {
    let mut out = Vec::new();
    loop {
        let mut byte = (value & 0x7f) as u8;
        value >>= 7;
        if value != 0 {
            byte |= 0x80;
        }
        out.push(byte);
        if value == 0 {
            break;
        }
    }
    out
}

/// A bare repository fixture with one pack, one loose object, and refs.
pub struct RepoFixture {
    pub dir: TempDir,
    /// Commit at the tip of `refs/heads/main` (packed, stored).
    pub commit_id: ObjectId,
    /// Root tree referenced by the commit (packed, stored).
    pub root_tree_id: ObjectId,
    /// Subtree stored as an offset-delta against the root tree.
    pub delta_tree_id: ObjectId,
    /// Blob stored whole in the pack.
    pub packed_blob_id: ObjectId,
    /// Blob stored as a loose object file.
    pub loose_blob_id: ObjectId,
    /// Tag target listed only in `packed-refs`.
    pub tag_id: ObjectId,
    pub commit_payload: Vec<u8>,
    pub root_tree_payload: Vec<u8>,
    pub delta_tree_payload: Vec<u8>,
    pub packed_blob_payload: Vec<u8>,
    pub loose_blob_payload: Vec<u8>,
}

impl RepoFixture {
    pub fn path(&self) -> &Path {
        self.dir.path()
    }
}

/// Lays the fixture repository out on disk.
pub fn build_repo() -> RepoFixture {
    let commit_id = ObjectId::from_raw([0x76; 20]);
    let root_tree_id = ObjectId::from_raw([0xb9; 20]);
    let delta_tree_id = ObjectId::from_raw([0xe3; 20]);
    let packed_blob_id = ObjectId::from_raw([0x82; 20]);
    let loose_blob_id = ObjectId::from_raw([0x39; 20]);
    let tag_id = ObjectId::from_raw([0x51; 20]);

    // Root tree: seven entries, directories first.
    let entry_ids: Vec<ObjectId> = (1u8..=7).map(|i| ObjectId::from_raw([i; 20])).collect();
    let entries = [
        tree_entry("40000", b"dira", &entry_ids[0]),
        tree_entry("40000", b"dirb", &entry_ids[1]),
        tree_entry("40000", b"dirc", &entry_ids[2]),
        tree_entry("100644", b"file1.txt", &packed_blob_id),
        tree_entry("100644", b"file2.txt", &entry_ids[4]),
        tree_entry("100755", b"file3.sh", &entry_ids[5]),
        tree_entry("120000", b"symlink", &loose_blob_id),
    ];
    let root_tree_payload: Vec<u8> = entries.concat();

    // Delta tree: copy the first two root entries, append a fresh one.
    let copied_len = entries[0].len() + entries[1].len();
    let appended = tree_entry("100644", b"extra.txt", &entry_ids[6]);
    let mut delta_tree_payload = root_tree_payload[..copied_len].to_vec();
    delta_tree_payload.extend_from_slice(&appended);

    let mut program = size_header(root_tree_payload.len() as u64);
    program.extend_from_slice(&size_header(delta_tree_payload.len() as u64));
    program.push(0x90); // copy, one length byte, offset 0
    program.push(copied_len as u8);
    program.push(appended.len() as u8); // insert
    program.extend_from_slice(&appended);

    let commit_payload = format!(
        "tree {root_tree_id}\n\
         author Ada Example <ada@example.com> 1378823654 +0200\n\
         committer Ada Example <ada@example.com> 1378823654 +0200\n\
         \n\
         Add dira through dirc\n"
    )
    .into_bytes();

    let packed_blob_payload = b"packed blob contents\n".to_vec();
    let loose_blob_payload = b"loose blob contents\n".to_vec();

    // Pack: commit, root tree, delta tree, blob.
    let mut pack = PackBuilder::new();
    let commit_offset = pack.add_stored(1, &commit_payload);
    let root_tree_offset = pack.add_stored(2, &root_tree_payload);
    let delta_tree_offset = pack.add_ofs_delta(root_tree_offset, &program);
    let blob_offset = pack.add_stored(3, &packed_blob_payload);

    let idx_bytes = build_idx(&[
        (commit_id, commit_offset),
        (root_tree_id, root_tree_offset),
        (delta_tree_id, delta_tree_offset),
        (packed_blob_id, blob_offset),
    ]);

    // Repository layout.
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    let pack_dir = root.join("objects").join("pack");
    fs::create_dir_all(&pack_dir).unwrap();

    let stem = "pack-0000000000000000000000000000000000000001";
    fs::write(pack_dir.join(format!("{stem}.pack")), pack.build()).unwrap();
    fs::write(pack_dir.join(format!("{stem}.idx")), idx_bytes).unwrap();

    // Loose object.
    let loose_hex = loose_blob_id.to_hex();
    let loose_dir = root.join("objects").join(&loose_hex[..2]);
    fs::create_dir_all(&loose_dir).unwrap();
    let mut raw = format!("blob {}\0", loose_blob_payload.len()).into_bytes();
    raw.extend_from_slice(&loose_blob_payload);
    let mut enc = ZlibEncoder::new(Vec::new(), Compression::default());
    enc.write_all(&raw).unwrap();
    fs::write(loose_dir.join(&loose_hex[2..]), enc.finish().unwrap()).unwrap();

    // References.
    fs::create_dir_all(root.join("refs").join("heads")).unwrap();
    fs::write(root.join("HEAD"), "ref: refs/heads/main\n").unwrap();
    fs::write(
        root.join("refs").join("heads").join("main"),
        format!("{commit_id}\n"),
    )
    .unwrap();
    fs::write(
        root.join("packed-refs"),
        format!("# pack-refs with: peeled fully-peeled sorted\n{tag_id} refs/tags/v0.1\n"),
    )
    .unwrap();

    RepoFixture {
        dir,
        commit_id,
        root_tree_id,
        delta_tree_id,
        packed_blob_id,
        loose_blob_id,
        tag_id,
        commit_payload,
        root_tree_payload,
        delta_tree_payload,
        packed_blob_payload,
        loose_blob_payload,
    }
}
