//! File backend tests: packages written to disk and read back

#![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]

use pretty_assertions::assert_eq;
use tempfile::TempDir;
use unreal_archive::math::Vector;
use unreal_archive::profile::PACKAGE_FILE_TAG;
use unreal_archive::{
    Archive, ArchiveConfig, ArchiveContext, ArchiveError, ArchiveKind, ByteBulkData, FString,
    FileReader, FileWriter, Game, LazyArray, LazyPolicy, ReaderWrapper, SerializeExt, TArray,
    probe_package,
};

fn small_buffers() -> ArchiveConfig {
    ArchiveConfig::default()
        .with_read_buffer_size(16)
        .with_write_buffer_size(8)
}

fn write_package(path: &std::path::Path, config: &ArchiveConfig) {
    let mut writer = FileWriter::create(path, config).expect("Failed to create package");
    writer
        .state_mut()
        .set_context(ArchiveContext::detect(584, 57, false, config))
        .unwrap();
    writer.store(&PACKAGE_FILE_TAG).unwrap();
    writer.store(&(584i32 | (57 << 16))).unwrap();
    writer.transfer(&mut FString::new("Borderlands")).unwrap();
    writer
        .transfer(&mut TArray::from(vec![
            Vector::new(1.0, 2.0, 3.0),
            Vector::new(-1.0, -2.0, -3.0),
        ]))
        .unwrap();
    writer
        .transfer(&mut LazyArray::new(TArray::from((0u16..100).collect::<Vec<_>>())))
        .unwrap();
    writer
        .transfer(&mut ByteBulkData::from_bytes(vec![0x5A; 40]).unwrap())
        .unwrap();
    writer.store(&0xC0DEu16).unwrap();
    writer.close().unwrap();
}

#[test]
fn test_package_round_trip_through_files() {
    let temp = TempDir::new().expect("Failed to create temp dir");
    let path = temp.path().join("level.upk");
    let config = small_buffers();
    write_package(&path, &config);

    let mut reader = FileReader::open(&path, &config).unwrap();
    assert!(reader.is_a(ArchiveKind::FileReader));
    let probe = probe_package(&mut reader, &config).unwrap();
    assert_eq!(probe.context.game(), Game::Borderlands);
    assert_eq!(probe.context.version(), 584);
    assert_eq!(probe.context.licensee_version(), 57);

    let title: FString = reader.load().unwrap();
    assert_eq!(title.to_string(), "Borderlands");
    let vectors: TArray<Vector> = reader.load().unwrap();
    assert_eq!(vectors[1], Vector::new(-1.0, -2.0, -3.0));
    let lazy: LazyArray<u16> = reader.load().unwrap();
    assert_eq!(lazy.len(), 100);
    assert_eq!(lazy[99], 99);
    let bulk: ByteBulkData = reader.load().unwrap();
    assert_eq!(bulk.data(), &[0x5A; 40][..]);
    assert_eq!(reader.load::<u16>().unwrap(), 0xC0DE);
    assert!(reader.is_eof());
    reader.close().unwrap();
}

#[test]
fn test_deferred_lazy_array_from_file() {
    let temp = TempDir::new().expect("Failed to create temp dir");
    let path = temp.path().join("deferred.upk");
    write_package(&path, &small_buffers());

    let config = small_buffers().with_lazy_policy(LazyPolicy::Deferred);
    let mut reader = FileReader::open(&path, &config).unwrap();
    probe_package(&mut reader, &config).unwrap();
    reader.load::<FString>().unwrap();
    reader.load::<TArray<Vector>>().unwrap();

    let mut lazy: LazyArray<u16> = reader.load().unwrap();
    assert!(lazy.is_deferred());
    let after_lazy = reader.tell();
    let bulk: ByteBulkData = reader.load().unwrap();
    assert_eq!(bulk.data().len(), 40);

    let items = lazy.materialize(&mut reader).unwrap();
    assert_eq!(items.len(), 100);
    assert!(reader.tell() > after_lazy);
    assert_eq!(reader.load::<u16>().unwrap(), 0xC0DE);
}

#[test]
fn test_wrapper_over_file_reader() {
    let temp = TempDir::new().expect("Failed to create temp dir");
    let path = temp.path().join("embedded.bin");
    {
        let mut writer = FileWriter::create(&path, &ArchiveConfig::default()).unwrap();
        writer.skip_bytes(10).unwrap();
        writer.transfer(&mut FString::new("inner")).unwrap();
        writer.close().unwrap();
    }

    let mut reader = FileReader::open(&path, &ArchiveConfig::default()).unwrap();
    let mut wrapper = ReaderWrapper::new(&mut reader, 10).unwrap();
    assert!(wrapper.is_a(ArchiveKind::Wrapper));
    assert!(wrapper.is_a(ArchiveKind::FileReader));
    assert_eq!(wrapper.tell(), 0);
    let text: FString = wrapper.load().unwrap();
    assert_eq!(&text, "inner");
    assert!(wrapper.is_eof());
}

#[test]
fn test_missing_files() {
    let temp = TempDir::new().expect("Failed to create temp dir");
    let path = temp.path().join("absent.ubulk");

    let err = FileReader::open(&path, &ArchiveConfig::default()).unwrap_err();
    assert!(matches!(err, ArchiveError::Open { .. }));
    assert!(err.to_string().contains("absent.ubulk"));

    let optional = FileReader::open_optional(&path, &ArchiveConfig::default()).unwrap();
    assert!(optional.is_none());
}

#[test]
fn test_external_bulk_file() {
    let temp = TempDir::new().expect("Failed to create temp dir");
    let bulk_path = temp.path().join("textures.tfc");
    {
        let mut writer = FileWriter::create(&bulk_path, &ArchiveConfig::default()).unwrap();
        writer.skip_bytes(100).unwrap();
        let mut payload = vec![1u8, 2, 3, 4, 5, 6];
        writer.serialize_bytes(&mut payload).unwrap();
        writer.close().unwrap();
    }

    let mut header = 0x01u32.to_le_bytes().to_vec();
    for value in [6i32, 100, 6] {
        header.extend_from_slice(&value.to_le_bytes());
    }
    let mut reader = unreal_archive::MemReader::new(&header);
    let mut external = FileReader::open(&bulk_path, &ArchiveConfig::default()).unwrap();
    let mut bulk = ByteBulkData::default();
    bulk.load(&mut reader, Some(&mut external)).unwrap();
    assert_eq!(bulk.data(), &[1, 2, 3, 4, 5, 6]);
}
