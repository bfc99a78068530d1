//! Fingerprint injection script
//!
//! Renders the init script that spoofs the page's observable surfaces
//! (navigator, screen, timezone, touch, permissions, plugins, canvas, WebGL,
//! audio, connection, battery) from a descriptor. Must be registered on the
//! page before the first navigation.

use super::Fingerprint;

/// Render the spoof script for one descriptor.
pub fn spoof_script(fp: &Fingerprint) -> String {
    // Serialize cannot fail for this plain-data struct.
    let descriptor = serde_json::to_string(fp).unwrap_or_else(|_| "{}".to_string());
    SPOOF_TEMPLATE.replace("__FINGERPRINT__", &descriptor)
}

const SPOOF_TEMPLATE: &str = r#"
(() => {
  const fp = __FINGERPRINT__;

  /* Navigator props */
  Object.defineProperty(navigator, 'platform', { get: () => fp.platform });
  Object.defineProperty(navigator, 'language', { get: () => fp.browserLanguages[0] });
  Object.defineProperty(navigator, 'languages', { get: () => fp.browserLanguages });
  Object.defineProperty(navigator, 'hardwareConcurrency', { get: () => fp.hardwareConcurrency });
  Object.defineProperty(navigator, 'deviceMemory', { get: () => fp.deviceMemory });
  Object.defineProperty(navigator, 'maxTouchPoints', { get: () => fp.maxTouchPoints });
  Object.defineProperty(navigator, 'userAgent', { get: () => fp.userAgent });
  Object.defineProperty(navigator, 'webdriver', { get: () => false });
  Object.defineProperty(navigator, 'doNotTrack', { get: () => '1' });

  /* Screen & window dimensions */
  Object.defineProperty(window, 'devicePixelRatio', { get: () => fp.deviceScaleFactor });
  Object.defineProperty(screen, 'width', { get: () => fp.viewportWidth });
  Object.defineProperty(screen, 'height', { get: () => fp.viewportHeight });
  Object.defineProperty(screen, 'colorDepth', { get: () => 24 });
  Object.defineProperty(screen, 'pixelDepth', { get: () => 24 });

  /* Timezone */
  const origResolved = Intl.DateTimeFormat.prototype.resolvedOptions;
  Intl.DateTimeFormat.prototype.resolvedOptions = function () {
    const opts = origResolved.call(this);
    opts.timeZone = fp.timezone;
    opts.locale = fp.browserLanguages[0];
    return opts;
  };

  /* Touch support */
  if (fp.hasTouch) {
    Object.defineProperty(window, 'ontouchstart', { get: () => null });
    Object.defineProperty(window, 'ontouchend', { get: () => null });
    Object.defineProperty(window, 'ontouchmove', { get: () => null });
  }

  /* Permissions API */
  if (navigator.permissions && navigator.permissions.query) {
    const origQuery = navigator.permissions.query.bind(navigator.permissions);
    navigator.permissions.query = (params) =>
      params && params.name === 'notifications'
        ? Promise.resolve({ state: Notification.permission })
        : origQuery(params);
  }

  /* Plugins & mimeTypes */
  const pluginSet = fp.isMobile
    ? []
    : [
        { name: 'PDF Viewer', description: 'Portable Document Format', filename: 'internal-pdf-viewer' },
        { name: 'Chrome PDF Viewer', description: 'Portable Document Format', filename: 'internal-pdf-viewer' },
      ];
  Object.defineProperty(navigator, 'plugins', { get: () => pluginSet });
  Object.defineProperty(navigator, 'mimeTypes', {
    get: () =>
      pluginSet.map((p) => ({
        type: 'application/pdf',
        description: p.description,
        suffixes: 'pdf',
        enabledPlugin: { description: p.description },
      })),
  });

  /* Canvas noise keyed by the per-session seed */
  const seed = fp.canvasSeed;
  const toDataURLOriginal = HTMLCanvasElement.prototype.toDataURL;
  HTMLCanvasElement.prototype.toDataURL = function () {
    const ctx = this.getContext('2d');
    if (ctx && this.width > 0 && this.height > 0) {
      ctx.fillStyle = 'rgba(' + (parseInt(seed.slice(0, 2), 16) % 16) + ',0,0,0.01)';
      ctx.fillRect(0, 0, 1, 1);
    }
    return toDataURLOriginal.apply(this, arguments);
  };

  /* WebGL vendor/renderer */
  const origGetParam = WebGLRenderingContext.prototype.getParameter;
  WebGLRenderingContext.prototype.getParameter = function (param) {
    if (param === 37445) return fp.webglVendor;
    if (param === 37446) return fp.webglRenderer;
    return origGetParam.call(this, param);
  };

  /* AudioContext noise */
  const AC = window.AudioContext || window.webkitAudioContext;
  if (AC && AC.prototype.createAnalyser) {
    const origGetChannelData = AudioBuffer.prototype.getChannelData;
    AudioBuffer.prototype.getChannelData = function () {
      const data = origGetChannelData.apply(this, arguments);
      const shift = (parseInt(seed.slice(2, 6), 16) % 100) * 1e-9;
      for (let i = 0; i < data.length; i += 100) data[i] += shift;
      return data;
    };
  }

  /* Connection spoof */
  if (navigator.connection) {
    const conn = navigator.connection;
    Object.defineProperty(conn, 'effectiveType', { get: () => fp.connection.effectiveType });
    Object.defineProperty(conn, 'downlink', { get: () => fp.connection.downlink });
    Object.defineProperty(conn, 'rtt', { get: () => fp.connection.rtt });
  }

  /* Battery API */
  Object.defineProperty(navigator, 'getBattery', {
    value: () =>
      Promise.resolve({
        charging: fp.battery.charging,
        level: fp.battery.level,
        chargingTime: fp.battery.charging ? 0 : Infinity,
        dischargingTime: fp.battery.charging ? Infinity : 7200,
      }),
  });
})();
"#;
