//! Integration tests for windowed batch processing and entity placeholders.

use std::fs::{self, File};
use std::io::BufReader;

use subsplit::{BatchConfig, BatchDriver, BatchError, Bpe, EntityMatcher, MergeTable, Mode};

fn make_bpe() -> Bpe {
    Bpe::new(MergeTable::parse("#version: 0.2\nl o\nlo w\ne r</w>\nt h\nth e</w>\n").unwrap())
}

fn corpus(lines: usize) -> Vec<String> {
    (0..lines)
        .map(|i| match i % 4 {
            0 => format!("the lower {i}"),
            1 => "  slower   flower ".to_string(),
            2 => String::new(),
            _ => format!("naïve über{i} the"),
        })
        .collect()
}

/// Encode then decode through files; every line comes back trimmed.
#[test]
fn test_file_roundtrip_preserves_order() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("input.txt");
    let encoded = dir.path().join("encoded.txt");
    let decoded = dir.path().join("decoded.txt");

    let lines = corpus(2500);
    fs::write(&input, lines.join("\n") + "\n").unwrap();

    let encoder = BatchDriver::new(
        make_bpe(),
        BatchConfig {
            workers: 4,
            batch_size: 300,
            mode: Mode::Encode,
        },
    );
    let stats = encoder
        .run(
            BufReader::new(File::open(&input).unwrap()),
            File::create(&encoded).unwrap(),
        )
        .unwrap();
    assert_eq!(stats.lines, 2500);
    assert_eq!(stats.windows, 3);

    let decoder = BatchDriver::new(
        make_bpe(),
        BatchConfig {
            mode: Mode::Decode,
            ..BatchConfig::default()
        },
    );
    decoder
        .run(
            BufReader::new(File::open(&encoded).unwrap()),
            File::create(&decoded).unwrap(),
        )
        .unwrap();

    let bpe = make_bpe();
    let encoded_text = fs::read_to_string(&encoded).unwrap();
    let decoded_text = fs::read_to_string(&decoded).unwrap();
    for (i, line) in lines.iter().enumerate() {
        let words: Vec<&str> = line.split_whitespace().collect();
        assert_eq!(
            encoded_text.lines().nth(i).unwrap(),
            bpe.encode_to_string(line).unwrap()
        );
        assert_eq!(decoded_text.lines().nth(i).unwrap(), words.join(" "));
    }
}

#[test]
fn test_output_independent_of_worker_count() {
    let input = corpus(3000).join("\n");
    let mut outputs = Vec::new();

    for workers in [1, 2, 5] {
        let driver = BatchDriver::new(
            make_bpe(),
            BatchConfig {
                workers,
                batch_size: 700,
                mode: Mode::Encode,
            },
        );
        let mut output = Vec::new();
        driver.run(input.as_bytes(), &mut output).unwrap();
        outputs.push(output);
    }

    assert_eq!(outputs[0], outputs[1]);
    assert_eq!(outputs[0], outputs[2]);
}

#[test]
fn test_invalid_utf8_aborts() {
    let driver = BatchDriver::new(make_bpe(), BatchConfig::default());
    let input: &[u8] = b"low\n\xff\xfe\n";
    let mut output = Vec::new();
    let err = driver.run(input, &mut output).unwrap_err();
    assert!(matches!(err, BatchError::Io(_)));
    assert!(output.is_empty());
}

#[test]
fn test_entity_placeholders_survive_segmentation() {
    let dir = tempfile::tempdir().unwrap();
    let dict = dir.path().join("entities.txt");
    fs::write(&dict, "Paris;巴黎;LOC\nMarie Curie;居里夫人;\n").unwrap();

    let matcher = EntityMatcher::from_file(&dict, false).unwrap();
    let (text, replacements) = matcher.replace("marie curie lived in PARIS").unwrap();
    assert_eq!(text, "<--plhd-PN-0/> lived in <--plhd-LOC-0/>");
    assert_eq!(replacements[1], ("<--plhd-LOC-0/>".to_string(), "巴黎".to_string()));

    let bpe = make_bpe().with_glossary(
        subsplit::Glossary::new(replacements.iter().map(|(placeholder, _)| placeholder)).unwrap(),
    );
    let encoded = bpe.encode_to_string(&text).unwrap();
    assert!(encoded.starts_with("<--plhd-PN-0/> "));
    assert!(encoded.ends_with(" <--plhd-LOC-0/>"));
    assert_eq!(bpe.decode_str(&encoded), text);
}
