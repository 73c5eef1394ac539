use indexmap::IndexMap;
use x12_codec::utils::EdiConverter;
use x12_codec::{
    Delimiters, EdiValidator, EdiValue, SchemaRegistry, SchemaRegistryBuilder, X12Decoder,
    X12Encoder,
};

fn fixture_registry() -> SchemaRegistry {
    SchemaRegistryBuilder::load_dir("tests/fixtures/formats").expect("fixture registry loads")
}

fn document(entries: Vec<(&str, EdiValue)>) -> EdiValue {
    let map: IndexMap<String, EdiValue> = entries
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();
    EdiValue::Map(map)
}

fn positional(values: &[&str]) -> EdiValue {
    EdiValue::List(values.iter().map(|v| EdiValue::from(*v)).collect())
}

fn purchase_order() -> EdiValue {
    document(vec![
        ("ST", positional(&["850", "000000001"])),
        (
            "BEG",
            EdiValue::List(vec![
                EdiValue::from("00"),
                EdiValue::from("SA"),
                EdiValue::from("PO-001"),
                EdiValue::Null,
                EdiValue::from("20200101"),
            ]),
        ),
        (
            "L_N1",
            EdiValue::List(vec![document(vec![
                (
                    "N1",
                    EdiValue::List(vec![EdiValue::from("BY"), EdiValue::from("ACME CORP")]),
                ),
                ("N4", positional(&["SEATTLE", "WA", "98101"])),
            ])]),
        ),
        (
            "L_PO1",
            EdiValue::List(vec![document(vec![
                (
                    "PO1",
                    EdiValue::List(vec![
                        EdiValue::from("1"),
                        EdiValue::from("10"),
                        EdiValue::from("EA"),
                        EdiValue::from("2.5"),
                        EdiValue::Null,
                        EdiValue::from("BP"),
                        EdiValue::from("ITEM-001"),
                    ]),
                ),
                (
                    "PID",
                    EdiValue::List(vec![EdiValue::List(vec![
                        EdiValue::from("F"),
                        EdiValue::Null,
                        EdiValue::Null,
                        EdiValue::Null,
                        EdiValue::from("WIDGET"),
                    ])]),
                ),
            ])]),
        ),
        ("CTT", positional(&["1"])),
        ("SE", positional(&["9", "000000001"])),
    ])
}

#[test]
fn test_encode_then_decode_then_encode_is_stable() {
    let registry = fixture_registry();
    let encoder = X12Encoder::new(&registry);
    let decoder = X12Decoder::new(&registry);

    let first = encoder.build(&purchase_order()).unwrap();
    let (_, decoded) = decoder.parse_transaction(&first).unwrap();
    let positional = EdiConverter::to_element_list(&decoded).unwrap();
    let second = encoder.build(&positional).unwrap();

    assert_eq!(first, second);
}

#[test]
fn test_decode_of_encoded_output_recovers_values() {
    let registry = fixture_registry();
    let encoder = X12Encoder::new(&registry);
    let decoder = X12Decoder::new(&registry);

    let text = encoder.build(&purchase_order()).unwrap();
    let (order, decoded) = decoder.parse_transaction(&text).unwrap();

    assert_eq!(order, vec!["ST", "BEG", "L_N1", "L_PO1", "CTT", "SE"]);
    let map = decoded.as_map().unwrap();

    let beg = map.get("BEG").unwrap().as_map().unwrap();
    assert_eq!(beg.get("BEG03"), Some(&EdiValue::Str("PO-001".into())));
    // the omitted optional element decodes back to null
    assert_eq!(beg.get("BEG04"), Some(&EdiValue::Null));

    let po1 = map.get("L_PO1").unwrap().as_list().unwrap()[0]
        .as_map()
        .unwrap()
        .get("PO1")
        .unwrap()
        .as_map()
        .unwrap();
    assert_eq!(po1.get("PO102"), Some(&EdiValue::Real(10.0)));
    assert_eq!(po1.get("PO104"), Some(&EdiValue::Real(2.5)));
}

#[test]
fn test_envelope_round_trip_byte_exact() {
    let registry = fixture_registry();
    let text = "ISA^00^          ^00^          ^ZZ^SENDERID       ^ZZ^RECEIVERID     ^200101^1253^U^00401^000000001^0^T^:~GS^IN^SENDERID^RECEIVERID^20200101^1253^1^X^004010~ST^810^000000001~BIG^20200101^INV001~TDS^1050~CTT^1~SE^6^000000001~GE^1^1~IEA^1^000000001~";

    let decoder = X12Decoder::new(&registry);
    let (_, decoded) = decoder.parse(text).unwrap();

    let positional = EdiConverter::to_element_list(&decoded).unwrap();
    let rebuilt = X12Encoder::new(&registry)
        .with_delimiters(Delimiters::new("~", '^', '`', ':'))
        .build(&positional)
        .unwrap();

    assert_eq!(rebuilt, text);
}

#[test]
fn test_round_trip_document_validates_clean() {
    let registry = fixture_registry();
    let encoder = X12Encoder::new(&registry);
    let decoder = X12Decoder::new(&registry);

    let text = encoder.build(&purchase_order()).unwrap();
    let (_, decoded) = decoder.parse_transaction(&text).unwrap();

    let errors = EdiValidator::new().validate(&decoded, registry.get("850").unwrap());
    // a bare transaction body has no interchange envelope, which is the
    // only thing the validator should flag
    assert!(errors
        .iter()
        .all(|e| matches!(e.name.as_str(), "ISA" | "IEA")), "unexpected findings: {:?}", errors);
}
