use bridge_codec::{DecodeError, decode_envelope};

#[test]
fn decodes_full_envelope() {
    let payload = br#"{"mac":"24:62:AB:F2:9A:D0","sensor":"bme280","data":{"temp":25.17,"humi":17.6,"pres":1016.53}}"#;
    let reading = decode_envelope(payload).expect("decoded");
    assert_eq!(reading.device_id.as_deref(), Some("24:62:AB:F2:9A:D0"));
    assert_eq!(reading.format, None);
    assert_eq!(reading.tags["sensor"], "bme280");
    assert_eq!(reading.fields["temp"], 25.17);
    assert_eq!(reading.fields["humi"], 17.6);
    assert_eq!(reading.fields["pres"], 1016.53);
}

#[test]
fn optional_sn_and_id_become_tags() {
    let payload =
        br#"{"mac":"AA","sensor":"scd30","sn":"0042","id":"AQBURK01","data":{"co2":615.0}}"#;
    let reading = decode_envelope(payload).expect("decoded");
    assert_eq!(reading.tags["sn"], "0042");
    assert_eq!(reading.tags["id"], "AQBURK01");
}

#[test]
fn missing_keys_are_rejected() {
    let err = decode_envelope(br#"{"sensor":"bme280","data":{"temp":1.0}}"#).expect_err("no mac");
    assert!(matches!(err, DecodeError::MissingField(ref key) if key == "mac"));

    let err = decode_envelope(br#"{"mac":"AA","data":{"temp":1.0}}"#).expect_err("no sensor");
    assert!(matches!(err, DecodeError::MissingField(ref key) if key == "sensor"));

    let err = decode_envelope(br#"{"mac":"AA","sensor":"bme280"}"#).expect_err("no data");
    assert!(matches!(err, DecodeError::MissingField(ref key) if key == "data"));
}

#[test]
fn non_numeric_data_entry_is_rejected() {
    let err = decode_envelope(br#"{"mac":"AA","sensor":"s","data":{"temp":"hot"}}"#)
        .expect_err("rejected");
    assert!(matches!(err, DecodeError::InvalidFieldType(_)));

    let err = decode_envelope(br#"{"mac":"AA","sensor":"s","data":{"ok":true}}"#)
        .expect_err("rejected");
    assert!(matches!(err, DecodeError::InvalidFieldType(_)));
}

#[test]
fn non_mapping_data_is_rejected() {
    let err =
        decode_envelope(br#"{"mac":"AA","sensor":"s","data":[1,2]}"#).expect_err("rejected");
    assert!(matches!(err, DecodeError::InvalidFieldType(_)));

    let err = decode_envelope(br#"{"mac":"AA","sensor":"s","data":{}}"#).expect_err("rejected");
    assert!(matches!(err, DecodeError::InvalidFieldType(_)));
}

#[test]
fn malformed_json_is_rejected() {
    let err = decode_envelope(b"not json at all").expect_err("rejected");
    assert!(matches!(err, DecodeError::InvalidFieldType(_)));

    let err = decode_envelope(br#"[1,2,3]"#).expect_err("rejected");
    assert!(matches!(err, DecodeError::InvalidFieldType(_)));
}

#[test]
fn wrongly_typed_required_keys_are_rejected() {
    let err = decode_envelope(br#"{"mac":7,"sensor":"s","data":{"t":1.0}}"#).expect_err("rejected");
    assert!(matches!(err, DecodeError::InvalidFieldType(_)));
}
