//! XML-RPC wire codec.
//!
//! Encodes `methodCall` documents and decodes `methodResponse` documents
//! (including `<fault>` answers) to and from [`RpcValue`] trees. Shape
//! violations surface as a single [`CdrError::MalformedUpstreamResponse`]
//! carrying the raw payload, so cast-style failures never leak into the
//! rest of the engine.

use quick_xml::escape::escape;
use quick_xml::events::Event;
use quick_xml::Reader;
use tracing::error;

use super::value::RpcValue;
use crate::error::{CdrError, Result};

/// Serializes one remote procedure call.
pub fn encode_call(method: &str, params: &[RpcValue]) -> String {
    let mut xml = String::with_capacity(256);
    xml.push_str("<?xml version=\"1.0\" encoding=\"utf-8\"?>");
    xml.push_str("<methodCall><methodName>");
    xml.push_str(&escape(method));
    xml.push_str("</methodName><params>");
    for param in params {
        xml.push_str("<param>");
        encode_value(&mut xml, param);
        xml.push_str("</param>");
    }
    xml.push_str("</params></methodCall>");
    xml
}

fn encode_value(xml: &mut String, value: &RpcValue) {
    xml.push_str("<value>");
    match value {
        RpcValue::Nil => xml.push_str("<nil/>"),
        RpcValue::Bool(b) => {
            xml.push_str("<boolean>");
            xml.push_str(if *b { "1" } else { "0" });
            xml.push_str("</boolean>");
        }
        RpcValue::Int(i) => {
            xml.push_str("<int>");
            xml.push_str(&i.to_string());
            xml.push_str("</int>");
        }
        RpcValue::Double(d) => {
            xml.push_str("<double>");
            xml.push_str(&d.to_string());
            xml.push_str("</double>");
        }
        RpcValue::String(s) => {
            xml.push_str("<string>");
            xml.push_str(&escape(s.as_str()));
            xml.push_str("</string>");
        }
        RpcValue::Array(items) => {
            xml.push_str("<array><data>");
            for item in items {
                encode_value(xml, item);
            }
            xml.push_str("</data></array>");
        }
        RpcValue::Struct(members) => {
            xml.push_str("<struct>");
            for (name, member) in members {
                xml.push_str("<member><name>");
                xml.push_str(&escape(name.as_str()));
                xml.push_str("</name>");
                encode_value(xml, member);
                xml.push_str("</member>");
            }
            xml.push_str("</struct>");
        }
    }
    xml.push_str("</value>");
}

/// Decodes a `methodResponse` document into the call's result value.
///
/// A `<fault>` answer becomes [`CdrError::RpcFault`]; any structural
/// surprise becomes [`CdrError::MalformedUpstreamResponse`].
pub fn decode_response(xml: &str) -> Result<RpcValue> {
    let mut reader = Reader::from_str(xml);
    let mut in_fault = false;
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => match e.name().as_ref() {
                b"fault" => in_fault = true,
                b"value" => {
                    let value = read_value_body(&mut reader, xml)?;
                    if in_fault {
                        return Err(fault_error(&value, xml));
                    }
                    return Ok(value);
                }
                b"methodResponse" | b"params" | b"param" => {}
                _ => return Err(malformed(xml, "unexpected element in methodResponse")),
            },
            Ok(Event::Eof) => return Err(malformed(xml, "no value in methodResponse")),
            Ok(_) => {}
            Err(e) => return Err(malformed(xml, &e.to_string())),
        }
    }
}

/// Reads the body of a `<value>` element whose start tag is already
/// consumed, up to and including its end tag.
fn read_value_body(reader: &mut Reader<&[u8]>, xml: &str) -> Result<RpcValue> {
    let mut value: Option<RpcValue> = None;
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let scalar = match e.name().as_ref() {
                    b"array" => {
                        value = Some(read_array(reader, xml)?);
                        continue;
                    }
                    b"struct" => {
                        value = Some(read_struct(reader, xml)?);
                        continue;
                    }
                    b"i4" | b"int" => {
                        let text = read_scalar_text(reader, xml)?;
                        RpcValue::Int(
                            text.trim()
                                .parse()
                                .map_err(|_| malformed(xml, "invalid int value"))?,
                        )
                    }
                    b"boolean" => {
                        let text = read_scalar_text(reader, xml)?;
                        RpcValue::Bool(text.trim() == "1")
                    }
                    b"double" => {
                        let text = read_scalar_text(reader, xml)?;
                        RpcValue::Double(
                            text.trim()
                                .parse()
                                .map_err(|_| malformed(xml, "invalid double value"))?,
                        )
                    }
                    b"string" => RpcValue::String(read_scalar_text(reader, xml)?),
                    b"nil" => {
                        read_scalar_text(reader, xml)?;
                        RpcValue::Nil
                    }
                    _ => return Err(malformed(xml, "unsupported value type")),
                };
                value = Some(scalar);
            }
            Ok(Event::Empty(e)) => match e.name().as_ref() {
                b"nil" => value = Some(RpcValue::Nil),
                b"string" => value = Some(RpcValue::String(String::new())),
                _ => return Err(malformed(xml, "unsupported empty value element")),
            },
            Ok(Event::Text(t)) => {
                let text = t
                    .unescape()
                    .map_err(|e| malformed(xml, &e.to_string()))?
                    .into_owned();
                // Bare text inside <value> is an implicit string; ignore
                // the indentation around typed elements.
                if value.is_none() && !text.trim().is_empty() {
                    value = Some(RpcValue::String(text));
                }
            }
            Ok(Event::End(e)) if e.name().as_ref() == b"value" => {
                return Ok(value.unwrap_or_else(|| RpcValue::String(String::new())));
            }
            Ok(Event::End(_)) => {}
            Ok(Event::Eof) => return Err(malformed(xml, "unterminated value element")),
            Ok(_) => {}
            Err(e) => return Err(malformed(xml, &e.to_string())),
        }
    }
}

fn read_array(reader: &mut Reader<&[u8]>, xml: &str) -> Result<RpcValue> {
    let mut items = Vec::new();
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => match e.name().as_ref() {
                b"data" => {}
                b"value" => items.push(read_value_body(reader, xml)?),
                _ => return Err(malformed(xml, "unexpected element in array")),
            },
            Ok(Event::End(e)) if e.name().as_ref() == b"array" => {
                return Ok(RpcValue::Array(items));
            }
            Ok(Event::End(_)) => {}
            Ok(Event::Text(_)) => {}
            Ok(Event::Eof) => return Err(malformed(xml, "unterminated array element")),
            Ok(_) => {}
            Err(e) => return Err(malformed(xml, &e.to_string())),
        }
    }
}

fn read_struct(reader: &mut Reader<&[u8]>, xml: &str) -> Result<RpcValue> {
    let mut members = Vec::new();
    let mut pending_name: Option<String> = None;
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => match e.name().as_ref() {
                b"member" => pending_name = None,
                b"name" => pending_name = Some(read_scalar_text(reader, xml)?),
                b"value" => {
                    let name = pending_name
                        .take()
                        .ok_or_else(|| malformed(xml, "struct member value before name"))?;
                    members.push((name, read_value_body(reader, xml)?));
                }
                _ => return Err(malformed(xml, "unexpected element in struct")),
            },
            Ok(Event::End(e)) if e.name().as_ref() == b"struct" => {
                return Ok(RpcValue::Struct(members));
            }
            Ok(Event::End(_)) => {}
            Ok(Event::Text(_)) => {}
            Ok(Event::Eof) => return Err(malformed(xml, "unterminated struct element")),
            Ok(_) => {}
            Err(e) => return Err(malformed(xml, &e.to_string())),
        }
    }
}

/// Reads text content up to the current element's end tag.
fn read_scalar_text(reader: &mut Reader<&[u8]>, xml: &str) -> Result<String> {
    let mut text = String::new();
    loop {
        match reader.read_event() {
            Ok(Event::Text(t)) => {
                text.push_str(&t.unescape().map_err(|e| malformed(xml, &e.to_string()))?);
            }
            Ok(Event::CData(t)) => {
                text.push_str(&String::from_utf8_lossy(&t.into_inner()));
            }
            Ok(Event::End(_)) => return Ok(text),
            Ok(Event::Eof) => return Err(malformed(xml, "unterminated scalar element")),
            Ok(_) => return Err(malformed(xml, "unexpected content in scalar element")),
            Err(e) => return Err(malformed(xml, &e.to_string())),
        }
    }
}

fn fault_error(value: &RpcValue, xml: &str) -> CdrError {
    let code = value
        .get("faultCode")
        .and_then(RpcValue::as_i32)
        .unwrap_or(0);
    let message = value
        .get("faultString")
        .and_then(RpcValue::as_str)
        .unwrap_or("unknown fault")
        .to_string();
    if value.get("faultCode").is_none() && value.get("faultString").is_none() {
        return malformed(xml, "fault without faultCode/faultString");
    }
    CdrError::RpcFault { code, message }
}

fn malformed(payload: &str, detail: &str) -> CdrError {
    error!(detail, payload, "malformed XML-RPC response");
    CdrError::MalformedUpstreamResponse {
        payload: payload.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_call_without_params() {
        let xml = encode_call("getXmlFiles", &[]);
        assert!(xml.contains("<methodName>getXmlFiles</methodName>"));
        assert!(xml.contains("<params></params>"));
    }

    #[test]
    fn encodes_and_escapes_string_param() {
        let xml = encode_call("echo", &[RpcValue::from("a<b&c")]);
        assert!(xml.contains("<string>a&lt;b&amp;c</string>"));
    }

    #[test]
    fn decodes_struct_of_arrays_preserving_order() {
        let xml = r#"<?xml version="1.0"?>
            <methodResponse><params><param><value><struct>
              <member><name>schemaB</name><value><array><data>
                <value><array><data>
                  <value><string>http://x/b.xml</string></value>
                  <value><string>File B</string></value>
                </data></array></value>
              </data></array></value></member>
              <member><name>schemaA</name><value><array><data>
              </data></array></value></member>
            </struct></value></param></params></methodResponse>"#;

        let value = decode_response(xml).unwrap();
        let RpcValue::Struct(members) = value else {
            panic!("expected struct")
        };
        assert_eq!(members[0].0, "schemaB");
        assert_eq!(members[1].0, "schemaA");
        let bucket = members[0].1.as_array().unwrap();
        let file = bucket[0].as_array().unwrap();
        assert_eq!(file[0].as_str(), Some("http://x/b.xml"));
        assert_eq!(file[1].as_str(), Some("File B"));
    }

    #[test]
    fn decodes_untyped_value_as_string() {
        let xml = "<methodResponse><params><param><value>plain</value></param></params></methodResponse>";
        assert_eq!(decode_response(xml).unwrap(), RpcValue::String("plain".into()));
    }

    #[test]
    fn decodes_nil_response() {
        let xml =
            "<methodResponse><params><param><value><nil/></value></param></params></methodResponse>";
        assert_eq!(decode_response(xml).unwrap(), RpcValue::Nil);
    }

    #[test]
    fn fault_becomes_rpc_fault_error() {
        let xml = r#"<methodResponse><fault><value><struct>
            <member><name>faultCode</name><value><int>105</int></value></member>
            <member><name>faultString</name><value><string>no such envelope</string></value></member>
        </struct></value></fault></methodResponse>"#;

        match decode_response(xml) {
            Err(CdrError::RpcFault { code, message }) => {
                assert_eq!(code, 105);
                assert_eq!(message, "no such envelope");
            }
            other => panic!("expected fault, got {other:?}"),
        }
    }

    #[test]
    fn garbage_is_malformed_with_payload() {
        let xml = "<methodResponse><params><param><value><unknown>1</unknown></value></param></params></methodResponse>";
        match decode_response(xml) {
            Err(CdrError::MalformedUpstreamResponse { payload }) => {
                assert!(payload.contains("unknown"));
            }
            other => panic!("expected malformed error, got {other:?}"),
        }
    }

    #[test]
    fn call_round_trips_through_decoder() {
        let params = RpcValue::Struct(vec![(
            "files".into(),
            RpcValue::Array(vec![RpcValue::Int(3), RpcValue::Bool(true)]),
        )]);
        let xml = encode_call("m", &[params.clone()])
            .replace("methodCall", "methodResponse")
            .replace("<methodName>m</methodName>", "");
        assert_eq!(decode_response(&xml).unwrap(), params);
    }
}
