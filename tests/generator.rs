use camino::Utf8PathBuf;

use sddm::generator::{PIPELINE_FILE, PIPELINE_STUB, generate_example_descriptor};

#[test]
fn repeated_generation_increments_counter() {
    let temp = tempfile::tempdir().unwrap();
    let folder = Utf8PathBuf::from_path_buf(temp.path().join("descrikptorFolderExample10")).unwrap();

    let first = generate_example_descriptor(&folder).unwrap();
    std::fs::write(folder.join("descriktor_0.json").as_std_path(), r#"{"edited": true}"#).unwrap();
    let second = generate_example_descriptor(&folder).unwrap();
    let third = generate_example_descriptor(&folder).unwrap();

    assert_eq!(first.descriptor_file, "descriktor_0.json");
    assert_eq!(second.descriptor_file, "descriktor_1.json");
    assert_eq!(third.descriptor_file, "descriktor_2.json");
    assert!(first.pipeline_created);
    assert!(!second.pipeline_created);

    let kept = std::fs::read_to_string(folder.join("descriktor_0.json").as_std_path()).unwrap();
    assert_eq!(kept, r#"{"edited": true}"#);
    let pipeline = std::fs::read_to_string(folder.join(PIPELINE_FILE).as_std_path()).unwrap();
    assert_eq!(pipeline, PIPELINE_STUB);
}
