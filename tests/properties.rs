//! Property-based tests for normalization, schema locking and round trips.

use proptest::prelude::*;
use recfmt::normalize::{render, unrender, Escaping, RenderContext};
use recfmt::{
    DynamicRecord, FieldDescriptor, FixedLengthOptions, FixedLengthReader, FixedLengthWriter,
    FormatReader, Justification, RecordDescriptor, Value, XmlOptions, XmlReader, XmlWriter,
};

fn justification() -> impl Strategy<Value = Justification> {
    prop_oneof![Just(Justification::Left), Just(Justification::Right)]
}

proptest! {
    /// Padded text always has exactly the field size and unpads to the input.
    #[test]
    fn prop_padding_roundtrip(
        text in "[a-zA-Z0-9]{0,8}",
        extra in 0usize..6,
        justification in justification(),
    ) {
        let size = 8 + extra;
        let field = FieldDescriptor::new("f").size(size).justification(justification);
        let ctx = RenderContext::new("\n", Escaping::None);
        let rendered = render(&text, &field, &ctx).unwrap();
        prop_assert_eq!(rendered.chars().count(), size);
        prop_assert_eq!(unrender(&rendered, &field, Escaping::None).unwrap(), text);
    }

    /// Truncation keeps the leading characters and never exceeds the size.
    #[test]
    fn prop_truncation_keeps_prefix(text in "\\PC{0,30}", size in 1usize..12) {
        let field = FieldDescriptor::new("f").size(size).truncate(true);
        let rendered = render(&text, &field, &RenderContext::new("\n", Escaping::None)).unwrap();
        prop_assert_eq!(rendered.chars().count(), size);
        let kept: String = text.chars().take(size).collect();
        prop_assert!(rendered.starts_with(&kept));
    }

    /// The first record fixes the schema; later records cannot change it.
    #[test]
    fn prop_schema_locks_to_first_record(
        names in prop::collection::vec("[a-z]{1,6}", 1..6),
        extra in "[A-Z]{1,6}",
    ) {
        let mut unique: Vec<String> = Vec::new();
        for name in names {
            if !unique.contains(&name) {
                unique.push(name);
            }
        }
        let first: DynamicRecord = unique.iter().map(|n| (n.clone(), Value::from(1))).collect();
        let second = first.clone().with(extra, 2);

        let mut out = Vec::new();
        let mut writer = XmlWriter::xml(&mut out, RecordDescriptor::new(), XmlOptions::default());
        writer.write(&first).unwrap();
        writer.write(&second).unwrap();
        let locked: Vec<String> = writer
            .descriptor()
            .field_names()
            .into_iter()
            .map(str::to_string)
            .collect();
        prop_assert_eq!(locked, unique);
    }

    /// Whatever the XML writer escapes, the XML reader gets back.
    #[test]
    fn prop_xml_text_roundtrip(
        name in "[a-zA-Z0-9&<>' ]{1,12}",
        note in "[a-zA-Z0-9&<>' ]{1,12}",
    ) {
        let descriptor = || {
            RecordDescriptor::builder()
                .field(FieldDescriptor::xml_attribute("note"))
                .field(FieldDescriptor::xml_element("name"))
                .build()
                .unwrap()
        };
        let mut out = Vec::new();
        XmlWriter::xml(&mut out, descriptor(), XmlOptions::default())
            .write_all(vec![DynamicRecord::new().with("note", note.as_str()).with("name", name.as_str())])
            .unwrap();

        let mut reader = XmlReader::new(out.as_slice(), descriptor(), XmlOptions::default());
        let records = reader.read_all().unwrap();
        prop_assert_eq!(records.len(), 1);
        prop_assert_eq!(records[0].value("note"), Some(&Value::from(note)));
        prop_assert_eq!(records[0].value("name"), Some(&Value::from(name)));
    }

    /// Fixed-length lines read back into the values that were written.
    #[test]
    fn prop_fixed_length_roundtrip(
        rows in prop::collection::vec(("[A-Z]{1,4}", 0i64..100_000), 1..20),
    ) {
        let descriptor = || {
            RecordDescriptor::builder()
                .field(FieldDescriptor::fixed("code", 0, 4))
                .field(
                    FieldDescriptor::fixed("qty", 4, 6)
                        .justification(Justification::Right)
                        .fill_char('0'),
                )
                .build()
                .unwrap()
        };
        let records: Vec<DynamicRecord> = rows
            .iter()
            .map(|(code, qty)| DynamicRecord::new().with("code", code.as_str()).with("qty", *qty))
            .collect();

        let mut out = Vec::new();
        FixedLengthWriter::fixed_length(&mut out, descriptor(), FixedLengthOptions::default())
            .write_all(records)
            .unwrap();
        prop_assert_eq!(out.len(), rows.len() * 11);

        let mut reader = FixedLengthReader::new(out.as_slice(), descriptor(), FixedLengthOptions::default());
        let read = reader.read_all().unwrap();
        prop_assert_eq!(read.len(), rows.len());
        for (record, (code, qty)) in read.iter().zip(&rows) {
            prop_assert_eq!(record.value("code"), Some(&Value::from(code.as_str())));
            let digits = record.value("qty").and_then(Value::as_text).unwrap_or_default();
            let parsed = if digits.is_empty() { 0 } else { digits.parse::<i64>().unwrap() };
            prop_assert_eq!(parsed, *qty);
        }
    }
}
