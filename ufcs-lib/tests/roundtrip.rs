//! Codec laws: decode(encode(x)) == x for representable values

mod common;

use common::*;
use proptest::prelude::*;

fn control_msg() -> impl Strategy<Value = ControlMsg> {
    (0u8..=0x0F).prop_map(|raw| ControlMsg::try_from(raw).expect("every value below 0x10 is a control message"))
}

proptest! {
    #[test]
    fn header_roundtrip(num in 0u8..16, cmd in control_msg()) {
        let pkg = Package::control(num, cmd);
        let decoded = decode_header(&encode_header(&pkg)).unwrap();
        prop_assert_eq!(decoded, pkg);
        prop_assert_eq!(decoded.control_msg().unwrap(), cmd);
    }

    #[test]
    fn header_number_is_taken_modulo_sixteen(num in any::<u8>(), len in any::<u8>()) {
        let pkg = Package::data(num, DataMsg::Request, len);
        let decoded = decode_header(&encode_header(&pkg)).unwrap();
        prop_assert_eq!(decoded.msg_number, num % 16);
        prop_assert_eq!(decoded.length, len);
    }

    #[test]
    fn request_roundtrip(mode in 0u8..16, curr in 0u32..=0xFFFF, volt in 0u32..=0xFFFF) {
        let req = RequestData {
            output_mode: mode,
            output_curr_ma: curr * 10,
            output_volt_mv: volt * 10,
        };
        let wire = req.encode().unwrap();
        prop_assert_eq!(wire.len(), 8);
        prop_assert_eq!(RequestData::decode(&wire).unwrap(), req);
    }

    #[test]
    fn capability_roundtrip(
        min_curr in 0u32..=0xFF,
        max_curr in 0u32..=0xFFFF,
        min_volt in 0u32..=0xFFFF,
        max_volt in 0u32..=0xFFFF,
        volt_step in 1u32..=2,
        curr_step in 1u32..=8,
        mode in 0u8..16,
    ) {
        let cap = Capability {
            min_curr_ma: min_curr * 10,
            max_curr_ma: max_curr * 10,
            min_volt_mv: min_volt * 10,
            max_volt_mv: max_volt * 10,
            volt_step_mv: volt_step * 10,
            curr_step_ma: curr_step * 10,
            output_mode: mode,
        };
        let record = cap.encode_record().unwrap();
        prop_assert_eq!(Capability::decode_record(&record).unwrap(), cap);
    }

    #[test]
    fn source_info_roundtrip(curr in 0u32..=0xFFFF, volt in 0u32..=0xFFFF, port in -50i16..=205, dev in -50i16..=205) {
        let info = SourceInfo {
            output_curr_ma: curr * 10,
            output_volt_mv: volt * 10,
            port_temp_c: port,
            dev_temp_c: dev,
        };
        prop_assert_eq!(SourceInfo::decode(&info.encode().unwrap()).unwrap(), info);
    }

    #[test]
    fn refuse_roundtrip(reason in any::<u8>(), cmd in any::<u8>(), msg_type in 0u8..8, num in 0u8..16) {
        let refuse = Refuse { reason, cmd_number: cmd, msg_type, msg_number: num };
        prop_assert_eq!(Refuse::decode(&refuse.encode().unwrap()).unwrap(), refuse);
    }

    #[test]
    fn decoders_never_panic(bytes in proptest::collection::vec(any::<u8>(), 0..64)) {
        let _ = decode_header(&bytes);
        let _ = OutputCapabilities::decode(&bytes);
        let _ = SourceInfo::decode(&bytes);
        let _ = DeviceInfo::decode(&bytes);
        let _ = Refuse::decode(&bytes);
        let _ = VerifyResponse::decode(&bytes);
    }
}

#[test]
fn test_out_of_range_values_rejected() {
    let req = RequestData {
        output_mode: 1,
        output_curr_ma: 700_000,
        output_volt_mv: 5000,
    };
    assert!(matches!(req.encode(), Err(UfcsError::ValueOutOfRange { field: "output_curr", .. })));

    let info = SourceInfo {
        output_curr_ma: 0,
        output_volt_mv: 0,
        port_temp_c: -51,
        dev_temp_c: 0,
    };
    assert!(info.encode().is_err());
}
