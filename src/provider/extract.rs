//! Locate the generated image reference in a provider payload.

use serde_json::Value;

fn non_empty_str(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// First image reference found in `payload`, checked in this order:
/// `imageUrl`, `images[0]` (string or `{url}`), `image.url`, `outputs[0].url`,
/// `outputs[0].image.url`, a nested `result`, `url`, and finally inline data in
/// `candidates[].content.parts[]`, returned as a `data:` URI.
pub fn extract_image_url(payload: &Value) -> Option<String> {
    let obj = payload.as_object()?;

    if let Some(url) = non_empty_str(obj.get("imageUrl")) {
        return Some(url);
    }

    if let Some(first) = obj
        .get("images")
        .and_then(Value::as_array)
        .and_then(|images| images.first())
    {
        if let Some(url) = non_empty_str(Some(first)).or_else(|| non_empty_str(first.get("url"))) {
            return Some(url);
        }
    }

    if let Some(url) = non_empty_str(obj.get("image").and_then(|image| image.get("url"))) {
        return Some(url);
    }

    if let Some(first) = obj
        .get("outputs")
        .and_then(Value::as_array)
        .and_then(|outputs| outputs.first())
    {
        let nested = first.get("image").and_then(|image| image.get("url"));
        if let Some(url) = non_empty_str(first.get("url")).or_else(|| non_empty_str(nested)) {
            return Some(url);
        }
    }

    if let Some(result) = obj.get("result").filter(|r| r.is_object()) {
        if let Some(url) = extract_image_url(result) {
            return Some(url);
        }
    }

    if let Some(url) = non_empty_str(obj.get("url")) {
        return Some(url);
    }

    inline_image_data(obj.get("candidates")?)
}

fn inline_image_data(candidates: &Value) -> Option<String> {
    for candidate in candidates.as_array()? {
        let Some(parts) = candidate
            .get("content")
            .and_then(|content| content.get("parts"))
            .and_then(Value::as_array)
        else {
            continue;
        };
        for part in parts {
            let inline = part.get("inlineData").or_else(|| part.get("inline_data"));
            let Some(inline) = inline else { continue };
            let Some(data) = non_empty_str(inline.get("data")) else {
                continue;
            };
            let mime_type = non_empty_str(inline.get("mimeType"))
                .or_else(|| non_empty_str(inline.get("mime_type")))
                .unwrap_or_else(|| "image/png".to_string());
            return Some(format!("data:{};base64,{}", mime_type, data));
        }
    }
    None
}
